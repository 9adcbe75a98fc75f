use crate::core::Bus;
use crate::cpu::z80::{Flag, Z80};
use crate::util::PARITY;

const FC: u8 = Flag::C as u8;
const FN: u8 = Flag::N as u8;
const FPV: u8 = Flag::PV as u8;
const FX: u8 = Flag::X as u8;
const FH: u8 = Flag::H as u8;
const FY: u8 = Flag::Y as u8;
const FZ: u8 = Flag::Z as u8;
const FS: u8 = Flag::S as u8;

/// S, Z and the undocumented bit-5/bit-3 copies of a result byte.
pub(crate) fn sz53(value: u8) -> u8 {
    (value & (FS | FY | FX)) | if value == 0 { FZ } else { 0 }
}

pub(crate) fn parity_flag(value: u8) -> u8 {
    if PARITY[value as usize] { FPV } else { 0 }
}

impl Z80 {
    // --- 8-bit arithmetic cores ---

    pub(crate) fn add8(&mut self, value: u8, carry_in: u8) {
        let a = self.a;
        let sum = a as u16 + value as u16 + carry_in as u16;
        let result = sum as u8;
        let mut f = sz53(result);
        if sum > 0xFF {
            f |= FC;
        }
        if ((a ^ value ^ result) & 0x10) != 0 {
            f |= FH;
        }
        if ((a ^ result) & (value ^ result) & 0x80) != 0 {
            f |= FPV;
        }
        self.a = result;
        self.set_f(f);
    }

    pub(crate) fn sub8(&mut self, value: u8, carry_in: u8, store: bool) {
        let a = self.a;
        let diff = a as i16 - value as i16 - carry_in as i16;
        let result = diff as u8;
        let mut f = sz53(result) | FN;
        if store {
            // SUB/SBC: X/Y from the result
        } else {
            // CP: X/Y from the operand
            f = (f & !(FX | FY)) | (value & (FX | FY));
        }
        if diff < 0 {
            f |= FC;
        }
        if ((a ^ value ^ result) & 0x10) != 0 {
            f |= FH;
        }
        if ((a ^ value) & (a ^ result) & 0x80) != 0 {
            f |= FPV;
        }
        if store {
            self.a = result;
        }
        self.set_f(f);
    }

    fn and8(&mut self, value: u8) {
        self.a &= value;
        let f = sz53(self.a) | parity_flag(self.a) | FH;
        self.set_f(f);
    }

    fn xor8(&mut self, value: u8) {
        self.a ^= value;
        let f = sz53(self.a) | parity_flag(self.a);
        self.set_f(f);
    }

    fn or8(&mut self, value: u8) {
        self.a |= value;
        let f = sz53(self.a) | parity_flag(self.a);
        self.set_f(f);
    }

    pub(crate) fn inc8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        let mut f = (self.f & FC) | sz53(result);
        if (result & 0x0F) == 0 {
            f |= FH;
        }
        if result == 0x80 {
            f |= FPV;
        }
        self.set_f(f);
        result
    }

    pub(crate) fn dec8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        let mut f = (self.f & FC) | sz53(result) | FN;
        if (value & 0x0F) == 0 {
            f |= FH;
        }
        if result == 0x7F {
            f |= FPV;
        }
        self.set_f(f);
        result
    }

    fn alu_apply(&mut self, operation: u8, value: u8) {
        let carry = self.f & FC;
        match operation {
            0 => self.add8(value, 0),            // ADD
            1 => self.add8(value, carry),        // ADC
            2 => self.sub8(value, 0, true),      // SUB
            3 => self.sub8(value, carry, true),  // SBC
            4 => self.and8(value),               // AND
            5 => self.xor8(value),               // XOR
            6 => self.or8(value),                // OR
            _ => self.sub8(value, 0, false),     // CP
        }
    }

    // --- Dispatched handlers ---

    /// ALU A,r — 4T (register), 7T ((HL)), 19T total with DD/FD.
    pub(crate) fn op_alu_r<B: Bus + ?Sized>(&mut self, bus: &mut B, opcode: u8) -> u32 {
        let src = opcode & 0x07;
        let operation = (opcode >> 3) & 0x07;
        let mut t = 4;
        let value = if src == 6 {
            t = 7;
            let addr = self.hl_operand_addr(bus, &mut t, 8);
            self.mem_read(bus, addr)
        } else {
            self.get_reg8_ix(src)
        };
        self.alu_apply(operation, value);
        t
    }

    /// ALU A,n — 7T.
    pub(crate) fn op_alu_n<B: Bus + ?Sized>(&mut self, bus: &mut B, opcode: u8) -> u32 {
        let operation = (opcode >> 3) & 0x07;
        let value = self.fetch_byte(bus);
        self.alu_apply(operation, value);
        7
    }

    /// INC/DEC r — 4T (register), 11T ((HL)), 23T total with DD/FD.
    pub(crate) fn op_inc_dec_r<B: Bus + ?Sized>(&mut self, bus: &mut B, opcode: u8) -> u32 {
        let reg = (opcode >> 3) & 0x07;
        let dec = (opcode & 0x01) != 0;
        if reg == 6 {
            let mut t = 11;
            let addr = self.hl_operand_addr(bus, &mut t, 8);
            let value = self.mem_read(bus, addr);
            let result = if dec { self.dec8(value) } else { self.inc8(value) };
            self.mem_write(bus, addr, result);
            t
        } else {
            let value = self.get_reg8_ix(reg);
            let result = if dec { self.dec8(value) } else { self.inc8(value) };
            self.set_reg8_ix(reg, result);
            4
        }
    }

    /// ADD HL,rr (or IX/IY with prefix) — 11T.
    pub(crate) fn op_add_hl_rr(&mut self, opcode: u8) -> u32 {
        let rr = (opcode >> 4) & 0x03;
        let hl = self.get_rp(2);
        let value = self.get_rp(rr);
        let sum = hl as u32 + value as u32;
        let result = sum as u16;
        let mut f = self.f & (FS | FZ | FPV);
        f |= ((result >> 8) as u8) & (FX | FY);
        if ((hl ^ value ^ result) & 0x1000) != 0 {
            f |= FH;
        }
        if sum > 0xFFFF {
            f |= FC;
        }
        self.memptr = hl.wrapping_add(1);
        self.set_rp(2, result);
        self.set_f(f);
        11
    }

    /// ADC HL,rr — 15T (ED).
    pub(crate) fn op_adc_hl_rr(&mut self, opcode: u8) -> u32 {
        let rr = (opcode >> 4) & 0x03;
        let hl = self.get_hl();
        let value = self.get_rp(rr);
        let carry = (self.f & FC) as u32;
        let sum = hl as u32 + value as u32 + carry;
        let result = sum as u16;
        let mut f = ((result >> 8) as u8) & (FS | FX | FY);
        if result == 0 {
            f |= FZ;
        }
        if sum > 0xFFFF {
            f |= FC;
        }
        if ((hl ^ value ^ result) & 0x1000) != 0 {
            f |= FH;
        }
        if ((hl ^ result) & (value ^ result) & 0x8000) != 0 {
            f |= FPV;
        }
        self.memptr = hl.wrapping_add(1);
        self.set_hl(result);
        self.set_f(f);
        15
    }

    /// SBC HL,rr — 15T (ED).
    pub(crate) fn op_sbc_hl_rr(&mut self, opcode: u8) -> u32 {
        let rr = (opcode >> 4) & 0x03;
        let hl = self.get_hl();
        let value = self.get_rp(rr);
        let carry = (self.f & FC) as i32;
        let diff = hl as i32 - value as i32 - carry;
        let result = diff as u16;
        let mut f = (((result >> 8) as u8) & (FS | FX | FY)) | FN;
        if result == 0 {
            f |= FZ;
        }
        if diff < 0 {
            f |= FC;
        }
        if ((hl ^ value ^ result) & 0x1000) != 0 {
            f |= FH;
        }
        if ((hl ^ value) & (hl ^ result) & 0x8000) != 0 {
            f |= FPV;
        }
        self.memptr = hl.wrapping_add(1);
        self.set_hl(result);
        self.set_f(f);
        15
    }

    /// INC/DEC rr — 6T. No flags.
    pub(crate) fn op_inc_dec_rr(&mut self, opcode: u8) -> u32 {
        let rr = (opcode >> 4) & 0x03;
        let value = self.get_rp(rr);
        let result = if (opcode & 0x08) != 0 {
            value.wrapping_sub(1)
        } else {
            value.wrapping_add(1)
        };
        self.set_rp(rr, result);
        6
    }

    // --- Accumulator rotates — 4T ---

    pub(crate) fn op_rlca(&mut self) -> u32 {
        let carry = self.a >> 7;
        self.a = (self.a << 1) | carry;
        let f = (self.f & (FS | FZ | FPV)) | (self.a & (FX | FY)) | carry;
        self.set_f(f);
        4
    }

    pub(crate) fn op_rrca(&mut self) -> u32 {
        let carry = self.a & 0x01;
        self.a = (self.a >> 1) | (carry << 7);
        let f = (self.f & (FS | FZ | FPV)) | (self.a & (FX | FY)) | carry;
        self.set_f(f);
        4
    }

    pub(crate) fn op_rla(&mut self) -> u32 {
        let carry_in = self.f & FC;
        let carry_out = self.a >> 7;
        self.a = (self.a << 1) | carry_in;
        let f = (self.f & (FS | FZ | FPV)) | (self.a & (FX | FY)) | carry_out;
        self.set_f(f);
        4
    }

    pub(crate) fn op_rra(&mut self) -> u32 {
        let carry_in = self.f & FC;
        let carry_out = self.a & 0x01;
        self.a = (self.a >> 1) | (carry_in << 7);
        let f = (self.f & (FS | FZ | FPV)) | (self.a & (FX | FY)) | carry_out;
        self.set_f(f);
        4
    }

    // --- Misc ALU — 4T ---

    /// DAA: decimal-adjust A using the classical correction table keyed on
    /// the previous N, H, C.
    pub(crate) fn op_daa(&mut self) -> u32 {
        let a = self.a;
        let n = (self.f & FN) != 0;
        let h = (self.f & FH) != 0;
        let c = (self.f & FC) != 0;

        let mut correction = 0u8;
        let mut carry = c;
        if h || (a & 0x0F) > 0x09 {
            correction |= 0x06;
        }
        if c || a > 0x99 {
            correction |= 0x60;
            carry = true;
        }
        let result = if n {
            a.wrapping_sub(correction)
        } else {
            a.wrapping_add(correction)
        };

        let mut f = sz53(result) | parity_flag(result);
        if n {
            f |= FN;
        }
        if carry {
            f |= FC;
        }
        if ((a ^ result) & 0x10) != 0 {
            f |= FH;
        }
        self.a = result;
        self.set_f(f);
        4
    }

    pub(crate) fn op_cpl(&mut self) -> u32 {
        self.a = !self.a;
        let f = (self.f & (FS | FZ | FPV | FC)) | FH | FN | (self.a & (FX | FY));
        self.set_f(f);
        4
    }

    /// SCF. X/Y come from A, OR'd with the old flags when the previous
    /// instruction did not modify F (the Q register model).
    pub(crate) fn op_scf(&mut self) -> u32 {
        let stale = if self.prev_q == 0 { self.f } else { 0 };
        let f = (self.f & (FS | FZ | FPV)) | (((stale | self.a) & (FX | FY)) | FC);
        self.set_f(f);
        4
    }

    /// CCF. H takes the old carry; X/Y as in SCF.
    pub(crate) fn op_ccf(&mut self) -> u32 {
        let old_carry = self.f & FC;
        let stale = if self.prev_q == 0 { self.f } else { 0 };
        let mut f = (self.f & (FS | FZ | FPV)) | ((stale | self.a) & (FX | FY));
        if old_carry != 0 {
            f |= FH;
        } else {
            f |= FC;
        }
        self.set_f(f);
        4
    }

    /// NEG — 8T (ED).
    pub(crate) fn op_neg(&mut self) -> u32 {
        let value = self.a;
        self.a = 0;
        self.sub8(value, 0, true);
        8
    }

    /// RRD — 18T (ED). Low nibble of (HL) into A, nibble rotation through A.
    pub(crate) fn op_rrd<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let hl = self.get_hl();
        let value = self.mem_read(bus, hl);
        let new_mem = (self.a << 4) | (value >> 4);
        self.a = (self.a & 0xF0) | (value & 0x0F);
        self.mem_write(bus, hl, new_mem);
        self.memptr = hl.wrapping_add(1);
        let f = (self.f & FC) | sz53(self.a) | parity_flag(self.a);
        self.set_f(f);
        18
    }

    /// RLD — 18T (ED).
    pub(crate) fn op_rld<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let hl = self.get_hl();
        let value = self.mem_read(bus, hl);
        let new_mem = (value << 4) | (self.a & 0x0F);
        self.a = (self.a & 0xF0) | (value >> 4);
        self.mem_write(bus, hl, new_mem);
        self.memptr = hl.wrapping_add(1);
        let f = (self.f & FC) | sz53(self.a) | parity_flag(self.a);
        self.set_f(f);
        18
    }
}
