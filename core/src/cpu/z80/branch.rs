use crate::core::Bus;
use crate::cpu::z80::{Flag, Z80, alu::parity_flag, alu::sz53};

const FC: u8 = Flag::C as u8;
const FPV: u8 = Flag::PV as u8;
const FZ: u8 = Flag::Z as u8;
const FS: u8 = Flag::S as u8;

impl Z80 {
    /// Condition table: NZ, Z, NC, C, PO, PE, P, M.
    pub(crate) fn condition(&self, cc: u8) -> bool {
        match cc {
            0 => self.f & FZ == 0,
            1 => self.f & FZ != 0,
            2 => self.f & FC == 0,
            3 => self.f & FC != 0,
            4 => self.f & FPV == 0,
            5 => self.f & FPV != 0,
            6 => self.f & FS == 0,
            _ => self.f & FS != 0,
        }
    }

    /// JP nn — 10T
    pub(crate) fn op_jp_nn<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let target = self.fetch_word(bus);
        self.pc = target;
        self.memptr = target;
        10
    }

    /// JP cc,nn — 10T either way (the address is always read)
    pub(crate) fn op_jp_cc_nn<B: Bus + ?Sized>(&mut self, bus: &mut B, opcode: u8) -> u32 {
        let cc = (opcode >> 3) & 0x07;
        let target = self.fetch_word(bus);
        self.memptr = target;
        if self.condition(cc) {
            self.pc = target;
        }
        10
    }

    /// JP (HL)/(IX)/(IY) — 4T. No displacement involved.
    pub(crate) fn op_jp_hl(&mut self) -> u32 {
        self.pc = self.get_rp(2);
        4
    }

    /// JR e — 12T
    pub(crate) fn op_jr_e<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let offset = self.fetch_byte(bus) as i8;
        self.pc = self.pc.wrapping_add(offset as i16 as u16);
        self.memptr = self.pc;
        12
    }

    /// JR cc,e — 12T taken / 7T not taken (NZ/Z/NC/C only)
    pub(crate) fn op_jr_cc_e<B: Bus + ?Sized>(&mut self, bus: &mut B, opcode: u8) -> u32 {
        let cc = (opcode >> 3) & 0x03;
        let offset = self.fetch_byte(bus) as i8;
        if self.condition(cc) {
            self.pc = self.pc.wrapping_add(offset as i16 as u16);
            self.memptr = self.pc;
            12
        } else {
            7
        }
    }

    /// DJNZ e — 13T taken / 8T fall-through
    pub(crate) fn op_djnz<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let offset = self.fetch_byte(bus) as i8;
        self.b = self.b.wrapping_sub(1);
        if self.b != 0 {
            self.pc = self.pc.wrapping_add(offset as i16 as u16);
            self.memptr = self.pc;
            13
        } else {
            8
        }
    }

    /// CALL nn — 17T
    pub(crate) fn op_call_nn<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let target = self.fetch_word(bus);
        self.push16(bus, self.pc);
        self.pc = target;
        self.memptr = target;
        17
    }

    /// CALL cc,nn — 17T taken / 10T not taken
    pub(crate) fn op_call_cc_nn<B: Bus + ?Sized>(&mut self, bus: &mut B, opcode: u8) -> u32 {
        let cc = (opcode >> 3) & 0x07;
        let target = self.fetch_word(bus);
        self.memptr = target;
        if self.condition(cc) {
            self.push16(bus, self.pc);
            self.pc = target;
            17
        } else {
            10
        }
    }

    /// RET — 10T
    pub(crate) fn op_ret<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        self.pc = self.pop16(bus);
        self.memptr = self.pc;
        10
    }

    /// RET cc — 11T taken / 5T not taken
    pub(crate) fn op_ret_cc<B: Bus + ?Sized>(&mut self, bus: &mut B, opcode: u8) -> u32 {
        let cc = (opcode >> 3) & 0x07;
        if self.condition(cc) {
            self.pc = self.pop16(bus);
            self.memptr = self.pc;
            11
        } else {
            5
        }
    }

    /// RETN/RETI — 14T (ED). Both restore IFF1 from IFF2.
    pub(crate) fn op_retn<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        self.pc = self.pop16(bus);
        self.memptr = self.pc;
        self.iff1 = self.iff2;
        14
    }

    /// RST p — 11T
    pub(crate) fn op_rst<B: Bus + ?Sized>(&mut self, bus: &mut B, opcode: u8) -> u32 {
        self.push16(bus, self.pc);
        self.pc = (opcode & 0x38) as u16;
        self.memptr = self.pc;
        11
    }

    // --- I/O ---

    /// IN A,(n) — 11T. A rides the upper address lines.
    pub(crate) fn op_in_a_n<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let n = self.fetch_byte(bus);
        let port = ((self.a as u16) << 8) | n as u16;
        self.memptr = port.wrapping_add(1);
        self.a = self.port_read(bus, port);
        11
    }

    /// OUT (n),A — 11T
    pub(crate) fn op_out_n_a<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let n = self.fetch_byte(bus);
        let port = ((self.a as u16) << 8) | n as u16;
        self.memptr = ((self.a as u16) << 8) | (n.wrapping_add(1) as u16);
        self.port_write(bus, port, self.a);
        11
    }

    /// IN r,(C) — 12T (ED). r index 6 updates flags only.
    pub(crate) fn op_in_r_c<B: Bus + ?Sized>(&mut self, bus: &mut B, opcode: u8) -> u32 {
        let reg = (opcode >> 3) & 0x07;
        let port = self.get_bc();
        self.memptr = port.wrapping_add(1);
        let value = self.port_read(bus, port);
        if reg != 6 {
            self.set_reg8(reg, value);
        }
        let f = (self.f & FC) | sz53(value) | parity_flag(value);
        self.set_f(f);
        12
    }

    /// OUT (C),r — 12T (ED). r index 6 outputs 0.
    pub(crate) fn op_out_c_r<B: Bus + ?Sized>(&mut self, bus: &mut B, opcode: u8) -> u32 {
        let reg = (opcode >> 3) & 0x07;
        let port = self.get_bc();
        self.memptr = port.wrapping_add(1);
        let value = if reg == 6 { 0 } else { self.get_reg8(reg) };
        self.port_write(bus, port, value);
        12
    }

    // --- Interrupt enables — 4T each ---

    /// DI: both flip-flops drop immediately; any EI shadow is cancelled.
    pub(crate) fn op_di(&mut self) -> u32 {
        self.iff1 = false;
        self.iff2 = false;
        4
    }

    /// EI: flip-flops rise, but IRQ acceptance stays masked through the
    /// next instruction.
    pub(crate) fn op_ei(&mut self) -> u32 {
        self.iff1 = true;
        self.iff2 = true;
        self.ei_just_set = true;
        4
    }
}
