use crate::core::Bus;
use crate::cpu::z80::{Flag, Z80, alu::sz53};

const FC: u8 = Flag::C as u8;
const FPV: u8 = Flag::PV as u8;

impl Z80 {
    // --- 8-bit loads ---

    /// LD (BC),A — 7T
    pub(crate) fn op_ld_bc_a<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let addr = self.get_bc();
        self.mem_write(bus, addr, self.a);
        self.memptr = ((self.a as u16) << 8) | (addr.wrapping_add(1) & 0x00FF);
        7
    }

    /// LD (DE),A — 7T
    pub(crate) fn op_ld_de_a<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let addr = self.get_de();
        self.mem_write(bus, addr, self.a);
        self.memptr = ((self.a as u16) << 8) | (addr.wrapping_add(1) & 0x00FF);
        7
    }

    /// LD A,(BC) — 7T
    pub(crate) fn op_ld_a_bc<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let addr = self.get_bc();
        self.a = self.mem_read(bus, addr);
        self.memptr = addr.wrapping_add(1);
        7
    }

    /// LD A,(DE) — 7T
    pub(crate) fn op_ld_a_de<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let addr = self.get_de();
        self.a = self.mem_read(bus, addr);
        self.memptr = addr.wrapping_add(1);
        7
    }

    /// LD (nn),A — 13T
    pub(crate) fn op_ld_nn_a<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let addr = self.fetch_word(bus);
        self.mem_write(bus, addr, self.a);
        self.memptr = ((self.a as u16) << 8) | (addr.wrapping_add(1) & 0x00FF);
        13
    }

    /// LD A,(nn) — 13T
    pub(crate) fn op_ld_a_nn<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let addr = self.fetch_word(bus);
        self.a = self.mem_read(bus, addr);
        self.memptr = addr.wrapping_add(1);
        13
    }

    /// LD r,n — 7T (LD (HL),n — 10T, LD (IX+d),n — 19T total)
    pub(crate) fn op_ld_r_n<B: Bus + ?Sized>(&mut self, bus: &mut B, opcode: u8) -> u32 {
        let dst = (opcode >> 3) & 0x07;
        if dst == 6 {
            // Displacement precedes the immediate; its read overlaps the
            // internal add, so indexed forms cost 5 extra rather than 8.
            let mut t = 10;
            let addr = self.hl_operand_addr(bus, &mut t, 5);
            let value = self.fetch_byte(bus);
            self.mem_write(bus, addr, value);
            t
        } else {
            let value = self.fetch_byte(bus);
            self.set_reg8_ix(dst, value);
            7
        }
    }

    /// LD r,r' — 4T (memory forms 7T, indexed 19T total)
    pub(crate) fn op_ld_r_r<B: Bus + ?Sized>(&mut self, bus: &mut B, opcode: u8) -> u32 {
        let dst = (opcode >> 3) & 0x07;
        let src = opcode & 0x07;
        if src == 6 {
            // LD r,(HL)/(IX+d): the destination is always the real register,
            // even under DD/FD.
            let mut t = 7;
            let addr = self.hl_operand_addr(bus, &mut t, 8);
            let value = self.mem_read(bus, addr);
            self.set_reg8(dst, value);
            t
        } else if dst == 6 {
            let mut t = 7;
            let addr = self.hl_operand_addr(bus, &mut t, 8);
            let value = self.get_reg8(src);
            self.mem_write(bus, addr, value);
            t
        } else {
            let value = self.get_reg8_ix(src);
            self.set_reg8_ix(dst, value);
            4
        }
    }

    // --- 16-bit loads ---

    /// LD rr,nn — 10T
    pub(crate) fn op_ld_rr_nn<B: Bus + ?Sized>(&mut self, bus: &mut B, opcode: u8) -> u32 {
        let rr = (opcode >> 4) & 0x03;
        let value = self.fetch_word(bus);
        self.set_rp(rr, value);
        10
    }

    /// LD (nn),HL/IX/IY — 16T
    pub(crate) fn op_ld_nn_hl<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let addr = self.fetch_word(bus);
        let value = self.get_rp(2);
        self.mem_write(bus, addr, value as u8);
        self.mem_write(bus, addr.wrapping_add(1), (value >> 8) as u8);
        self.memptr = addr.wrapping_add(1);
        16
    }

    /// LD HL/IX/IY,(nn) — 16T
    pub(crate) fn op_ld_hl_nn_ind<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let addr = self.fetch_word(bus);
        let lo = self.mem_read(bus, addr) as u16;
        let hi = self.mem_read(bus, addr.wrapping_add(1)) as u16;
        self.set_rp(2, (hi << 8) | lo);
        self.memptr = addr.wrapping_add(1);
        16
    }

    /// LD (nn),rr — 20T (ED)
    pub(crate) fn op_ld_nn_rr_ed<B: Bus + ?Sized>(&mut self, bus: &mut B, opcode: u8) -> u32 {
        let rr = (opcode >> 4) & 0x03;
        let addr = self.fetch_word(bus);
        let value = self.get_rp(rr);
        self.mem_write(bus, addr, value as u8);
        self.mem_write(bus, addr.wrapping_add(1), (value >> 8) as u8);
        self.memptr = addr.wrapping_add(1);
        20
    }

    /// LD rr,(nn) — 20T (ED)
    pub(crate) fn op_ld_rr_nn_ed<B: Bus + ?Sized>(&mut self, bus: &mut B, opcode: u8) -> u32 {
        let rr = (opcode >> 4) & 0x03;
        let addr = self.fetch_word(bus);
        let lo = self.mem_read(bus, addr) as u16;
        let hi = self.mem_read(bus, addr.wrapping_add(1)) as u16;
        self.set_rp(rr, (hi << 8) | lo);
        self.memptr = addr.wrapping_add(1);
        20
    }

    /// LD SP,HL/IX/IY — 6T
    pub(crate) fn op_ld_sp_hl(&mut self) -> u32 {
        self.sp = self.get_rp(2);
        6
    }

    // --- Exchanges ---

    /// EX AF,AF' — 4T
    pub(crate) fn op_ex_af_af(&mut self) -> u32 {
        std::mem::swap(&mut self.a, &mut self.a_prime);
        std::mem::swap(&mut self.f, &mut self.f_prime);
        4
    }

    /// EX DE,HL — 4T. Always the real HL, even under DD/FD.
    pub(crate) fn op_ex_de_hl(&mut self) -> u32 {
        std::mem::swap(&mut self.d, &mut self.h);
        std::mem::swap(&mut self.e, &mut self.l);
        4
    }

    /// EXX — 4T
    pub(crate) fn op_exx(&mut self) -> u32 {
        std::mem::swap(&mut self.b, &mut self.b_prime);
        std::mem::swap(&mut self.c, &mut self.c_prime);
        std::mem::swap(&mut self.d, &mut self.d_prime);
        std::mem::swap(&mut self.e, &mut self.e_prime);
        std::mem::swap(&mut self.h, &mut self.h_prime);
        std::mem::swap(&mut self.l, &mut self.l_prime);
        4
    }

    /// EX (SP),HL/IX/IY — 19T
    pub(crate) fn op_ex_sp_hl<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let lo = self.mem_read(bus, self.sp) as u16;
        let hi = self.mem_read(bus, self.sp.wrapping_add(1)) as u16;
        let old = self.get_rp(2);
        self.mem_write(bus, self.sp, old as u8);
        self.mem_write(bus, self.sp.wrapping_add(1), (old >> 8) as u8);
        let new = (hi << 8) | lo;
        self.set_rp(2, new);
        self.memptr = new;
        19
    }

    // --- I and R transfers (ED) — 9T each ---

    pub(crate) fn op_ld_i_a(&mut self) -> u32 {
        self.i = self.a;
        9
    }

    pub(crate) fn op_ld_r_a(&mut self) -> u32 {
        // Writes the full byte; later refreshes preserve the new bit 7.
        self.r = self.a;
        9
    }

    pub(crate) fn op_ld_a_i(&mut self) -> u32 {
        self.a = self.i;
        let mut f = (self.f & FC) | sz53(self.a);
        if self.iff2 {
            f |= FPV;
        }
        self.set_f(f);
        9
    }

    pub(crate) fn op_ld_a_r(&mut self) -> u32 {
        self.a = self.r;
        let mut f = (self.f & FC) | sz53(self.a);
        if self.iff2 {
            f |= FPV;
        }
        self.set_f(f);
        9
    }

    /// IM 0/1/2 — 8T (ED)
    pub(crate) fn op_im(&mut self, opcode: u8) -> u32 {
        self.im = match (opcode >> 3) & 0x07 {
            2 | 6 => 1,
            3 | 7 => 2,
            _ => 0,
        };
        8
    }
}
