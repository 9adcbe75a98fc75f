use crate::core::Bus;
use crate::cpu::z80::{Flag, IndexMode, Z80, alu::parity_flag, alu::sz53};

const FC: u8 = Flag::C as u8;
const FPV: u8 = Flag::PV as u8;
const FX: u8 = Flag::X as u8;
const FH: u8 = Flag::H as u8;
const FY: u8 = Flag::Y as u8;
const FZ: u8 = Flag::Z as u8;
const FS: u8 = Flag::S as u8;

impl Z80 {
    /// Rotate/shift core shared by CB and DDCB forms.
    /// Kinds: 0=RLC 1=RRC 2=RL 3=RR 4=SLA 5=SRA 6=SLL 7=SRL.
    fn rot_apply(&mut self, kind: u8, value: u8) -> u8 {
        let carry_in = self.f & FC;
        let (result, carry_out) = match kind {
            0 => ((value << 1) | (value >> 7), value >> 7),
            1 => ((value >> 1) | (value << 7), value & 0x01),
            2 => ((value << 1) | carry_in, value >> 7),
            3 => ((value >> 1) | (carry_in << 7), value & 0x01),
            4 => (value << 1, value >> 7),
            5 => (((value as i8) >> 1) as u8, value & 0x01),
            // SLL: undocumented shift-left that sets bit 0
            6 => ((value << 1) | 0x01, value >> 7),
            _ => (value >> 1, value & 0x01),
        };
        let f = sz53(result) | parity_flag(result) | carry_out;
        self.set_f(f);
        result
    }

    /// BIT n flag recipe. X/Y come from the tested byte; Z and PV mirror
    /// each other; S only for a set bit 7.
    fn bit_flags(&mut self, bit: u8, value: u8) {
        let tested = value & (1 << bit);
        let mut f = (self.f & FC) | FH | (value & (FX | FY));
        if tested == 0 {
            f |= FZ | FPV;
        }
        if bit == 7 && tested != 0 {
            f |= FS;
        }
        self.set_f(f);
    }

    /// CB-prefixed dispatch (no DD/FD). Returns total T-states including
    /// both M1 fetches.
    pub(crate) fn execute_cb<B: Bus + ?Sized>(&mut self, bus: &mut B, opcode: u8) -> u32 {
        let reg = opcode & 0x07;
        let bit = (opcode >> 3) & 0x07;
        match opcode >> 6 {
            // Rotate/shift — 8T register, 15T (HL)
            0 => {
                if reg == 6 {
                    let addr = self.get_hl();
                    let value = self.mem_read(bus, addr);
                    let result = self.rot_apply(bit, value);
                    self.mem_write(bus, addr, result);
                    15
                } else {
                    let value = self.get_reg8(reg);
                    let result = self.rot_apply(bit, value);
                    self.set_reg8(reg, result);
                    8
                }
            }
            // BIT — 8T register, 12T (HL)
            1 => {
                if reg == 6 {
                    let addr = self.get_hl();
                    let value = self.mem_read(bus, addr);
                    self.bit_flags(bit, value);
                    12
                } else {
                    let value = self.get_reg8(reg);
                    self.bit_flags(bit, value);
                    8
                }
            }
            // RES — 8T register, 15T (HL)
            2 => {
                if reg == 6 {
                    let addr = self.get_hl();
                    let value = self.mem_read(bus, addr) & !(1 << bit);
                    self.mem_write(bus, addr, value);
                    15
                } else {
                    let value = self.get_reg8(reg) & !(1 << bit);
                    self.set_reg8(reg, value);
                    8
                }
            }
            // SET — 8T register, 15T (HL)
            _ => {
                if reg == 6 {
                    let addr = self.get_hl();
                    let value = self.mem_read(bus, addr) | (1 << bit);
                    self.mem_write(bus, addr, value);
                    15
                } else {
                    let value = self.get_reg8(reg) | (1 << bit);
                    self.set_reg8(reg, value);
                    8
                }
            }
        }
    }

    /// DD CB d op / FD CB d op. The displacement precedes the operation
    /// byte, which is read without a refresh cycle. Every combination
    /// resolves to the base rotate/shift/bit action on (IX+d)/(IY+d);
    /// register columns other than 6 also store the result in that
    /// register (the documented dual-write behavior).
    /// Returns body T-states: 16 for BIT (20 total), 19 otherwise (23 total).
    pub(crate) fn execute_index_cb<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let d = self.fetch_byte(bus) as i8;
        let base = if self.index_mode == IndexMode::IX {
            self.ix
        } else {
            self.iy
        };
        let addr = base.wrapping_add(d as i16 as u16);
        self.memptr = addr;

        // Operation byte is fetched as data, not via M1: no R increment.
        let opcode = self.fetch_byte(bus);
        let reg = opcode & 0x07;
        let bit = (opcode >> 3) & 0x07;

        match opcode >> 6 {
            0 => {
                let value = self.mem_read(bus, addr);
                let result = self.rot_apply(bit, value);
                self.mem_write(bus, addr, result);
                if reg != 6 {
                    self.set_reg8(reg, result);
                }
                19
            }
            1 => {
                let value = self.mem_read(bus, addr);
                self.bit_flags(bit, value);
                16
            }
            2 => {
                let value = self.mem_read(bus, addr) & !(1 << bit);
                self.mem_write(bus, addr, value);
                if reg != 6 {
                    self.set_reg8(reg, value);
                }
                19
            }
            _ => {
                let value = self.mem_read(bus, addr) | (1 << bit);
                self.mem_write(bus, addr, value);
                if reg != 6 {
                    self.set_reg8(reg, value);
                }
                19
            }
        }
    }
}
