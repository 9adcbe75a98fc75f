mod alu;
mod bit;
mod block;
mod branch;
mod load_store;
mod stack;

use crate::core::Bus;
use crate::cpu::{
    Cpu,
    state::{CpuStateTrait, Z80State},
};

#[repr(u8)]
#[derive(Copy, Clone, Debug)]
pub enum Flag {
    C = 0x01,  // Carry
    N = 0x02,  // Add/Subtract
    PV = 0x04, // Parity/Overflow
    X = 0x08,  // Unused (copy of bit 3)
    H = 0x10,  // Half Carry
    Y = 0x20,  // Unused (copy of bit 5)
    Z = 0x40,  // Zero
    S = 0x80,  // Sign
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum IndexMode {
    HL,
    IX,
    IY,
}

/// Result of one `step_one` call.
#[derive(Clone, Copy, Debug, Default)]
pub struct StepOutcome {
    /// T-states consumed, including prefix fetches and (when configured)
    /// wait-state penalties.
    pub cycles: u32,
    /// A maskable interrupt was accepted instead of an instruction.
    pub irq_accepted: bool,
    /// A non-maskable interrupt was accepted instead of an instruction.
    pub nmi_accepted: bool,
}

/// Unrecoverable configuration errors surfaced from `step_one`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepError {
    /// IM 0 acceptance was configured to inject an opcode outside the
    /// supported subset (RST n or a 0x00 no-op).
    UnsupportedIm0Opcode(u8),
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedIm0Opcode(op) => {
                write!(f, "unsupported IM 0 injected opcode 0x{op:02X}")
            }
        }
    }
}

impl std::error::Error for StepError {}

/// Optional per-access wait-state penalties.
///
/// Each hook returns extra T-states for one access to the given address or
/// port. `include_in_cycles` selects whether the penalties show up in the
/// reported per-instruction total.
#[derive(Default)]
pub struct WaitHooks {
    pub mem: Option<Box<dyn FnMut(u16) -> u32>>,
    pub io: Option<Box<dyn FnMut(u16) -> u32>>,
    pub include_in_cycles: bool,
}

pub struct Z80 {
    // Registers
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    // Shadow Registers
    pub a_prime: u8,
    pub f_prime: u8,
    pub b_prime: u8,
    pub c_prime: u8,
    pub d_prime: u8,
    pub e_prime: u8,
    pub h_prime: u8,
    pub l_prime: u8,
    // Index & Special Registers
    pub ix: u16,
    pub iy: u16,
    pub i: u8,
    pub r: u8,
    pub sp: u16,
    pub pc: u16,

    // Internal state
    pub iff1: bool,
    pub iff2: bool,
    pub im: u8,
    pub memptr: u16, // Hidden WZ register
    pub halted: bool,
    pub ei_delay: bool,
    pub q: u8,             // Copy of F when instruction modifies flags, 0 otherwise
    pub(crate) prev_q: u8, // Previous instruction's q value (for SCF/CCF X/Y)

    // Interrupt request latches
    pub(crate) irq_pending: bool,
    pub(crate) nmi_pending: bool,

    // Prefix handling
    pub(crate) index_mode: IndexMode,

    // External bus responses during interrupt acceptance
    im0_opcode: u8,
    im2_vector: u8,

    // Repeat-form block operations complete atomically when set
    fast_blocks: bool,

    // Wait-state model
    wait: Option<WaitHooks>,
    pub(crate) wait_tstates: u32,

    // EI executed by the current instruction (drives the one-instruction
    // IRQ deferral)
    ei_just_set: bool,
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

impl Z80 {
    pub fn new() -> Self {
        Self {
            a: 0xFF,
            f: 0xFF,
            b: 0xFF,
            c: 0xFF,
            d: 0xFF,
            e: 0xFF,
            h: 0xFF,
            l: 0xFF,
            a_prime: 0xFF,
            f_prime: 0xFF,
            b_prime: 0xFF,
            c_prime: 0xFF,
            d_prime: 0xFF,
            e_prime: 0xFF,
            h_prime: 0xFF,
            l_prime: 0xFF,
            ix: 0xFFFF,
            iy: 0xFFFF,
            i: 0,
            r: 0,
            sp: 0xFFFF,
            pc: 0x0000,
            iff1: false,
            iff2: false,
            im: 0,
            memptr: 0,
            halted: false,
            ei_delay: false,
            q: 0,
            prev_q: 0,
            irq_pending: false,
            nmi_pending: false,
            index_mode: IndexMode::HL,
            im0_opcode: 0xFF, // RST 38h, the conventional open-bus response
            im2_vector: 0xFF,
            fast_blocks: false,
            wait: None,
            wait_tstates: 0,
            ei_just_set: false,
        }
    }

    // --- Configuration ---

    /// Raise the maskable interrupt request line.
    pub fn request_irq(&mut self) {
        self.irq_pending = true;
    }

    /// Drop a pending maskable interrupt request (the device deasserted
    /// its wire before acceptance).
    pub fn clear_irq(&mut self) {
        self.irq_pending = false;
    }

    /// Raise the non-maskable interrupt request (one-shot edge).
    pub fn request_nmi(&mut self) {
        self.nmi_pending = true;
    }

    /// Opcode the bus presents during IM 0 acceptance (default 0xFF, RST 38h).
    pub fn set_im0_opcode(&mut self, opcode: u8) {
        self.im0_opcode = opcode;
    }

    /// Low vector byte the interrupting device presents during IM 2 acceptance.
    pub fn set_im2_vector(&mut self, vector: u8) {
        self.im2_vector = vector;
    }

    /// Execute repeat-form block operations (LDIR, CPIR, ...) atomically.
    /// Final registers, flags, memory, and total T-states are identical to
    /// iterative execution.
    pub fn set_fast_blocks(&mut self, enabled: bool) {
        self.fast_blocks = enabled;
    }

    /// Install or remove per-access wait-state penalty hooks.
    pub fn set_wait_state_hooks(&mut self, hooks: Option<WaitHooks>) {
        self.wait = hooks;
    }

    // --- 16-bit register pair access ---

    pub fn get_bc(&self) -> u16 {
        ((self.b as u16) << 8) | self.c as u16
    }
    pub fn set_bc(&mut self, val: u16) {
        self.b = (val >> 8) as u8;
        self.c = val as u8;
    }

    pub fn get_de(&self) -> u16 {
        ((self.d as u16) << 8) | self.e as u16
    }
    pub fn set_de(&mut self, val: u16) {
        self.d = (val >> 8) as u8;
        self.e = val as u8;
    }

    pub fn get_hl(&self) -> u16 {
        ((self.h as u16) << 8) | self.l as u16
    }
    pub fn set_hl(&mut self, val: u16) {
        self.h = (val >> 8) as u8;
        self.l = val as u8;
    }

    pub fn get_af(&self) -> u16 {
        ((self.a as u16) << 8) | self.f as u16
    }
    pub fn set_af(&mut self, val: u16) {
        self.a = (val >> 8) as u8;
        self.f = val as u8;
    }

    pub fn get_reg8(&self, index: u8) -> u8 {
        match index {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => self.h,
            5 => self.l,
            7 => self.a,
            _ => unreachable!("get_reg8 called with index {}", index),
        }
    }

    pub fn set_reg8(&mut self, index: u8, val: u8) {
        match index {
            0 => self.b = val,
            1 => self.c = val,
            2 => self.d = val,
            3 => self.e = val,
            4 => self.h = val,
            5 => self.l = val,
            7 => self.a = val,
            _ => unreachable!("set_reg8 called with index {}", index),
        }
    }

    /// Get 8-bit register by index, respecting IX/IY prefix for H/L
    /// (undocumented IXH/IXL/IYH/IYL). Index 6 is NOT handled here —
    /// callers must handle (HL)/(IX+d)/(IY+d) separately.
    pub fn get_reg8_ix(&self, index: u8) -> u8 {
        match (index, self.index_mode) {
            (4, IndexMode::IX) => (self.ix >> 8) as u8,
            (5, IndexMode::IX) => self.ix as u8,
            (4, IndexMode::IY) => (self.iy >> 8) as u8,
            (5, IndexMode::IY) => self.iy as u8,
            _ => self.get_reg8(index),
        }
    }

    pub fn set_reg8_ix(&mut self, index: u8, val: u8) {
        match (index, self.index_mode) {
            (4, IndexMode::IX) => self.ix = (self.ix & 0x00FF) | ((val as u16) << 8),
            (5, IndexMode::IX) => self.ix = (self.ix & 0xFF00) | val as u16,
            (4, IndexMode::IY) => self.iy = (self.iy & 0x00FF) | ((val as u16) << 8),
            (5, IndexMode::IY) => self.iy = (self.iy & 0xFF00) | val as u16,
            _ => self.set_reg8(index, val),
        }
    }

    /// Get 16-bit register pair by index (0=BC, 1=DE, 2=HL/IX/IY, 3=SP).
    /// Index 2 respects the current index mode for DD/FD prefixed instructions.
    pub(crate) fn get_rp(&self, index: u8) -> u16 {
        match index {
            0 => self.get_bc(),
            1 => self.get_de(),
            2 => match self.index_mode {
                IndexMode::HL => self.get_hl(),
                IndexMode::IX => self.ix,
                IndexMode::IY => self.iy,
            },
            3 => self.sp,
            _ => unreachable!("get_rp called with index {}", index),
        }
    }

    /// Set 16-bit register pair by index (0=BC, 1=DE, 2=HL/IX/IY, 3=SP).
    pub(crate) fn set_rp(&mut self, index: u8, val: u16) {
        match index {
            0 => self.set_bc(val),
            1 => self.set_de(val),
            2 => match self.index_mode {
                IndexMode::HL => self.set_hl(val),
                IndexMode::IX => self.ix = val,
                IndexMode::IY => self.iy = val,
            },
            3 => self.sp = val,
            _ => unreachable!("set_rp called with index {}", index),
        }
    }

    /// Get 16-bit register pair by index for PUSH/POP (3=AF instead of SP).
    pub(crate) fn get_rp_af(&self, index: u8) -> u16 {
        if index == 3 { self.get_af() } else { self.get_rp(index) }
    }

    /// Set 16-bit register pair by index for PUSH/POP (3=AF instead of SP).
    pub(crate) fn set_rp_af(&mut self, index: u8, val: u16) {
        if index == 3 {
            self.set_af(val);
        } else {
            self.set_rp(index, val);
        }
    }

    /// Write F and record it in Q (SCF/CCF look at whether the previous
    /// instruction touched the flags).
    pub(crate) fn set_f(&mut self, f: u8) {
        self.f = f;
        self.q = f;
    }

    // --- Bus access with wait-state accounting ---

    pub(crate) fn mem_read<B: Bus + ?Sized>(&mut self, bus: &mut B, addr: u16) -> u8 {
        if let Some(hooks) = self.wait.as_mut() {
            if let Some(hook) = hooks.mem.as_mut() {
                let extra = hook(addr);
                self.wait_tstates += extra;
            }
        }
        bus.read(addr)
    }

    pub(crate) fn mem_write<B: Bus + ?Sized>(&mut self, bus: &mut B, addr: u16, data: u8) {
        if let Some(hooks) = self.wait.as_mut() {
            if let Some(hook) = hooks.mem.as_mut() {
                let extra = hook(addr);
                self.wait_tstates += extra;
            }
        }
        bus.write(addr, data);
    }

    pub(crate) fn port_read<B: Bus + ?Sized>(&mut self, bus: &mut B, port: u16) -> u8 {
        if let Some(hooks) = self.wait.as_mut() {
            if let Some(hook) = hooks.io.as_mut() {
                let extra = hook(port);
                self.wait_tstates += extra;
            }
        }
        bus.io_read(port)
    }

    pub(crate) fn port_write<B: Bus + ?Sized>(&mut self, bus: &mut B, port: u16, data: u8) {
        if let Some(hooks) = self.wait.as_mut() {
            if let Some(hook) = hooks.io.as_mut() {
                let extra = hook(port);
                self.wait_tstates += extra;
            }
        }
        bus.io_write(port, data);
    }

    /// M1 opcode fetch: reads at PC, advances PC, refreshes R.
    pub(crate) fn fetch_opcode<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u8 {
        let op = self.mem_read(bus, self.pc);
        self.pc = self.pc.wrapping_add(1);
        self.r_inc();
        op
    }

    /// Operand byte fetch (no refresh).
    pub(crate) fn fetch_byte<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u8 {
        let v = self.mem_read(bus, self.pc);
        self.pc = self.pc.wrapping_add(1);
        v
    }

    /// Little-endian operand word fetch.
    pub(crate) fn fetch_word<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u16 {
        let lo = self.fetch_byte(bus) as u16;
        let hi = self.fetch_byte(bus) as u16;
        (hi << 8) | lo
    }

    /// R increments its low 7 bits on each M1 cycle; bit 7 is preserved.
    pub(crate) fn r_inc(&mut self) {
        self.r = (self.r & 0x80) | (self.r.wrapping_add(1) & 0x7F);
    }

    pub(crate) fn push16<B: Bus + ?Sized>(&mut self, bus: &mut B, val: u16) {
        self.sp = self.sp.wrapping_sub(1);
        self.mem_write(bus, self.sp, (val >> 8) as u8);
        self.sp = self.sp.wrapping_sub(1);
        self.mem_write(bus, self.sp, val as u8);
    }

    pub(crate) fn pop16<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u16 {
        let lo = self.mem_read(bus, self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        let hi = self.mem_read(bus, self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        (hi << 8) | lo
    }

    /// Effective address for a (HL)-class operand, honoring DD/FD prefixes.
    /// Indexed modes fetch the signed displacement and add `indexed_extra`
    /// T-states (8 for most forms, 5 where the displacement read overlaps
    /// the immediate fetch as in LD (IX+d),n).
    pub(crate) fn hl_operand_addr<B: Bus + ?Sized>(
        &mut self,
        bus: &mut B,
        t: &mut u32,
        indexed_extra: u32,
    ) -> u16 {
        match self.index_mode {
            IndexMode::HL => self.get_hl(),
            IndexMode::IX | IndexMode::IY => {
                let d = self.fetch_byte(bus) as i8;
                *t += indexed_extra;
                let base = if self.index_mode == IndexMode::IX {
                    self.ix
                } else {
                    self.iy
                };
                let addr = base.wrapping_add(d as i16 as u16);
                self.memptr = addr;
                addr
            }
        }
    }

    // --- Stepping ---

    /// Execute exactly one instruction (including any prefix chain), or
    /// perform an interrupt acceptance sequence if one is pending and
    /// acceptance conditions hold. Returns the consumed T-states and which
    /// interrupt, if any, was accepted.
    pub fn step_one<B: Bus + ?Sized>(&mut self, bus: &mut B) -> Result<StepOutcome, StepError> {
        self.wait_tstates = 0;

        // NMI: edge-triggered, bypasses IFF1 and the EI shadow.
        if self.nmi_pending {
            self.nmi_pending = false;
            self.halted = false;
            self.r_inc();
            self.iff1 = false; // IFF2 preserved for RETN
            self.push16(bus, self.pc);
            self.pc = 0x0066;
            self.memptr = self.pc;
            return Ok(self.outcome(11, false, true));
        }

        // IRQ: masked by IFF1 and by the instruction following EI.
        if self.irq_pending && self.iff1 && !self.ei_delay {
            return self.accept_irq(bus);
        }

        if self.halted {
            // HALT executes as a NOP that does not advance PC.
            self.r_inc();
            self.ei_delay = false;
            return Ok(self.outcome(4, false, false));
        }

        // The EI shadow lasts exactly one instruction: whatever executes
        // here clears it unless it is itself an EI.
        self.ei_just_set = false;
        let cycles = self.execute_one(bus);
        self.ei_delay = self.ei_just_set;
        Ok(self.outcome(cycles, false, false))
    }

    fn outcome(&self, base: u32, irq: bool, nmi: bool) -> StepOutcome {
        let include = self
            .wait
            .as_ref()
            .map(|h| h.include_in_cycles)
            .unwrap_or(false);
        StepOutcome {
            cycles: base + if include { self.wait_tstates } else { 0 },
            irq_accepted: irq,
            nmi_accepted: nmi,
        }
    }

    fn accept_irq<B: Bus + ?Sized>(&mut self, bus: &mut B) -> Result<StepOutcome, StepError> {
        // Validate IM 0 configuration before touching any state.
        if self.im == 0 {
            let op = self.im0_opcode;
            if op != 0x00 && (op & 0xC7) != 0xC7 {
                return Err(StepError::UnsupportedIm0Opcode(op));
            }
        }

        self.irq_pending = false;
        self.halted = false;
        self.r_inc();
        self.iff1 = false; // IFF2 preserved

        let cycles = match self.im {
            0 => {
                let op = self.im0_opcode;
                if (op & 0xC7) == 0xC7 {
                    // RST n
                    self.push16(bus, self.pc);
                    self.pc = (op & 0x38) as u16;
                    self.memptr = self.pc;
                }
                13
            }
            2 => {
                // I on the upper address bus, the device's vector byte on
                // the lower (unmasked, as the silicon behaves).
                let table = ((self.i as u16) << 8) | self.im2_vector as u16;
                let lo = self.mem_read(bus, table) as u16;
                let hi = self.mem_read(bus, table.wrapping_add(1)) as u16;
                self.push16(bus, self.pc);
                self.pc = (hi << 8) | lo;
                self.memptr = self.pc;
                19
            }
            _ => {
                // IM 1
                self.push16(bus, self.pc);
                self.pc = 0x0038;
                self.memptr = self.pc;
                13
            }
        };
        Ok(self.outcome(cycles, true, false))
    }

    /// Fetch and execute one instruction, chaining prefixes. Returns T-states.
    fn execute_one<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        self.prev_q = self.q;
        self.q = 0;
        self.index_mode = IndexMode::HL;

        let mut prefix_t: u32 = 0;
        let mut opcode = self.fetch_opcode(bus);
        loop {
            match opcode {
                0xDD => {
                    self.index_mode = IndexMode::IX;
                    prefix_t += 4;
                    opcode = self.fetch_opcode(bus);
                }
                0xFD => {
                    self.index_mode = IndexMode::IY;
                    prefix_t += 4;
                    opcode = self.fetch_opcode(bus);
                }
                _ => break,
            }
        }

        let body = match opcode {
            0xCB => {
                if self.index_mode == IndexMode::HL {
                    let sub = self.fetch_opcode(bus);
                    self.execute_cb(bus, sub)
                } else {
                    self.execute_index_cb(bus)
                }
            }
            0xED => {
                // ED cancels any DD/FD prefix.
                self.index_mode = IndexMode::HL;
                let sub = self.fetch_opcode(bus);
                self.execute_ed(bus, sub)
            }
            _ => self.execute_main(bus, opcode),
        };
        prefix_t + body
    }

    /// Unprefixed opcode dispatch. Returns T-states for the opcode body
    /// (prefix fetch cost is added by the caller).
    fn execute_main<B: Bus + ?Sized>(&mut self, bus: &mut B, opcode: u8) -> u32 {
        match opcode {
            // NOP — 4T
            0x00 => 4,

            // HALT — 4T. PC stays past HALT (already incremented by the fetch).
            0x76 => {
                self.halted = true;
                4
            }

            // --- Load/Store ---
            0x02 => self.op_ld_bc_a(bus),
            0x12 => self.op_ld_de_a(bus),
            0x22 => self.op_ld_nn_hl(bus),
            0x32 => self.op_ld_nn_a(bus),
            0x0A => self.op_ld_a_bc(bus),
            0x1A => self.op_ld_a_de(bus),
            0x2A => self.op_ld_hl_nn_ind(bus),
            0x3A => self.op_ld_a_nn(bus),
            0x08 => self.op_ex_af_af(),
            0xEB => self.op_ex_de_hl(),
            0xD9 => self.op_exx(),
            0xE3 => self.op_ex_sp_hl(bus),
            0xF9 => self.op_ld_sp_hl(),

            // LD rr,nn — 10T
            op if (op & 0xCF) == 0x01 => self.op_ld_rr_nn(bus, op),
            // LD r,n — 7T (LD (HL),n — 10T)
            op if (op & 0xC7) == 0x06 => self.op_ld_r_n(bus, op),
            // LD r,r' — 4T (memory forms 7T)
            op if (op & 0xC0) == 0x40 => self.op_ld_r_r(bus, op),

            // --- Stack ---
            op if (op & 0xCF) == 0xC5 => self.op_push(bus, op),
            op if (op & 0xCF) == 0xC1 => self.op_pop(bus, op),

            // --- ALU ---
            op if (op & 0xC0) == 0x80 => self.op_alu_r(bus, op),
            op if (op & 0xC7) == 0xC6 => self.op_alu_n(bus, op),
            op if (op & 0xC7) == 0x04 => self.op_inc_dec_r(bus, op),
            op if (op & 0xC7) == 0x05 => self.op_inc_dec_r(bus, op),
            op if (op & 0xCF) == 0x09 => self.op_add_hl_rr(op),
            op if (op & 0xCF) == 0x03 => self.op_inc_dec_rr(op),
            op if (op & 0xCF) == 0x0B => self.op_inc_dec_rr(op),

            // Accumulator rotates — 4T
            0x07 => self.op_rlca(),
            0x0F => self.op_rrca(),
            0x17 => self.op_rla(),
            0x1F => self.op_rra(),

            // Misc ALU — 4T
            0x27 => self.op_daa(),
            0x2F => self.op_cpl(),
            0x37 => self.op_scf(),
            0x3F => self.op_ccf(),

            // --- Branch/Control Flow ---
            0xC3 => self.op_jp_nn(bus),
            0xE9 => self.op_jp_hl(),
            0x18 => self.op_jr_e(bus),
            0x10 => self.op_djnz(bus),
            0xCD => self.op_call_nn(bus),
            0xC9 => self.op_ret(bus),
            0xDB => self.op_in_a_n(bus),
            0xD3 => self.op_out_n_a(bus),
            0xF3 => self.op_di(),
            0xFB => self.op_ei(),

            op if (op & 0xC7) == 0xC2 => self.op_jp_cc_nn(bus, op),
            op if (op & 0xE7) == 0x20 => self.op_jr_cc_e(bus, op),
            op if (op & 0xC7) == 0xC4 => self.op_call_cc_nn(bus, op),
            op if (op & 0xC7) == 0xC0 => self.op_ret_cc(bus, op),
            op if (op & 0xC7) == 0xC7 => self.op_rst(bus, op),

            // Every base opcode is defined; treat anything else as a
            // consumed byte.
            _ => 4,
        }
    }

    /// ED prefix dispatch. Returns total T-states for the whole instruction
    /// (both M1 fetches included).
    fn execute_ed<B: Bus + ?Sized>(&mut self, bus: &mut B, opcode: u8) -> u32 {
        match opcode {
            0x47 => self.op_ld_i_a(),
            0x4F => self.op_ld_r_a(),
            0x57 => self.op_ld_a_i(),
            0x5F => self.op_ld_a_r(),
            0x67 => self.op_rrd(bus),
            0x6F => self.op_rld(bus),

            // Block transfer/compare/IO
            0xA0 | 0xA8 => self.op_ldi_ldd(bus, opcode),
            0xA1 | 0xA9 => self.op_cpi_cpd(bus, opcode),
            0xA2 | 0xAA => self.op_ini_ind(bus, opcode),
            0xA3 | 0xAB => self.op_outi_outd(bus, opcode),
            0xB0 | 0xB8 => self.op_ldir_lddr(bus, opcode),
            0xB1 | 0xB9 => self.op_cpir_cpdr(bus, opcode),
            0xB2 | 0xBA => self.op_inir_indr(bus, opcode),
            0xB3 | 0xBB => self.op_otir_otdr(bus, opcode),

            op if (op & 0xC7) == 0x40 => self.op_in_r_c(bus, op),
            op if (op & 0xC7) == 0x41 => self.op_out_c_r(bus, op),
            op if (op & 0xCF) == 0x42 => self.op_sbc_hl_rr(op),
            op if (op & 0xCF) == 0x43 => self.op_ld_nn_rr_ed(bus, op),
            op if (op & 0xC7) == 0x44 => self.op_neg(),
            op if (op & 0xC7) == 0x45 => self.op_retn(bus),
            op if (op & 0xC7) == 0x46 => self.op_im(op),
            op if (op & 0xCF) == 0x4A => self.op_adc_hl_rr(op),
            op if (op & 0xCF) == 0x4B => self.op_ld_rr_nn_ed(bus, op),

            // Undefined ED opcodes act as 8T NOPs.
            _ => 8,
        }
    }
}

impl Cpu for Z80 {
    fn reset(&mut self) {
        self.pc = 0x0000;
        self.sp = 0xFFFF;
        self.a = 0xFF;
        self.f = 0xFF;
        self.i = 0;
        self.r = 0;
        self.im = 0;
        self.iff1 = false;
        self.iff2 = false;
        self.halted = false;
        self.ei_delay = false;
        self.irq_pending = false;
        self.nmi_pending = false;
    }

    fn is_sleeping(&self) -> bool {
        self.halted
    }
}

impl CpuStateTrait for Z80 {
    type Snapshot = Z80State;

    fn snapshot(&self) -> Z80State {
        Z80State {
            a: self.a,
            f: self.f,
            b: self.b,
            c: self.c,
            d: self.d,
            e: self.e,
            h: self.h,
            l: self.l,
            a_prime: self.a_prime,
            f_prime: self.f_prime,
            b_prime: self.b_prime,
            c_prime: self.c_prime,
            d_prime: self.d_prime,
            e_prime: self.e_prime,
            h_prime: self.h_prime,
            l_prime: self.l_prime,
            ix: self.ix,
            iy: self.iy,
            sp: self.sp,
            pc: self.pc,
            i: self.i,
            r: self.r,
            iff1: self.iff1,
            iff2: self.iff2,
            im: self.im,
            halted: self.halted,
            ei_delay: self.ei_delay,
            irq_pending: self.irq_pending,
            nmi_pending: self.nmi_pending,
            memptr: self.memptr,
            q: self.q,
        }
    }
}

impl Z80 {
    /// Restore the full register file and latches from a snapshot.
    pub fn set_state(&mut self, s: &Z80State) {
        self.a = s.a;
        self.f = s.f;
        self.b = s.b;
        self.c = s.c;
        self.d = s.d;
        self.e = s.e;
        self.h = s.h;
        self.l = s.l;
        self.a_prime = s.a_prime;
        self.f_prime = s.f_prime;
        self.b_prime = s.b_prime;
        self.c_prime = s.c_prime;
        self.d_prime = s.d_prime;
        self.e_prime = s.e_prime;
        self.h_prime = s.h_prime;
        self.l_prime = s.l_prime;
        self.ix = s.ix;
        self.iy = s.iy;
        self.sp = s.sp;
        self.pc = s.pc;
        self.i = s.i;
        self.r = s.r;
        self.iff1 = s.iff1;
        self.iff2 = s.iff2;
        self.im = s.im;
        self.halted = s.halted;
        self.ei_delay = s.ei_delay;
        self.irq_pending = s.irq_pending;
        self.nmi_pending = s.nmi_pending;
        self.memptr = s.memptr;
        self.q = s.q;
    }
}
