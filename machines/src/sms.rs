use mark3_core::core::machine::{InputButton, Machine};
use mark3_core::core::Bus;
use mark3_core::cpu::state::Z80State;
use mark3_core::cpu::z80::{StepError, WaitHooks, Z80};
use mark3_core::cpu::{Cpu, CpuStateTrait};
use mark3_core::device::sms_vdp::{FRAME_HEIGHT, FRAME_WIDTH, SmsVdp, VdpConfig};
use mark3_core::device::sn76489::Sn76489;

use crate::cartridge::{BANK_SIZE, BiosImage, CartridgeImage, RomLoadError};
use crate::registry::MachineEntry;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------
// Master clock:  10.738635 MHz (NTSC)
// CPU clock:     10.738635 / 3 = 3.579545 MHz
// Scanline:      228 CPU cycles
// NTSC frame:    262 lines = 59736 CPU cycles  (~59.92 Hz)
// PAL frame:     313 lines = 71364 CPU cycles  (~49.70 Hz)

pub const NTSC_CPU_HZ: u64 = 3_579_545;
pub const PAL_CPU_HZ: u64 = 3_546_893;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Region {
    #[default]
    Ntsc,
    Pal,
}

// ---------------------------------------------------------------------------
// Input button IDs
// ---------------------------------------------------------------------------
pub const INPUT_P1_UP: u8 = 0;
pub const INPUT_P1_DOWN: u8 = 1;
pub const INPUT_P1_LEFT: u8 = 2;
pub const INPUT_P1_RIGHT: u8 = 3;
pub const INPUT_P1_BUTTON1: u8 = 4;
pub const INPUT_P1_BUTTON2: u8 = 5;
pub const INPUT_P2_UP: u8 = 6;
pub const INPUT_P2_DOWN: u8 = 7;
pub const INPUT_P2_LEFT: u8 = 8;
pub const INPUT_P2_RIGHT: u8 = 9;
pub const INPUT_P2_BUTTON1: u8 = 10;
pub const INPUT_P2_BUTTON2: u8 = 11;
pub const INPUT_PAUSE: u8 = 12;
pub const INPUT_RESET: u8 = 13;

const SMS_INPUT_MAP: &[InputButton] = &[
    InputButton { id: INPUT_P1_UP, name: "P1 Up" },
    InputButton { id: INPUT_P1_DOWN, name: "P1 Down" },
    InputButton { id: INPUT_P1_LEFT, name: "P1 Left" },
    InputButton { id: INPUT_P1_RIGHT, name: "P1 Right" },
    InputButton { id: INPUT_P1_BUTTON1, name: "P1 Button 1" },
    InputButton { id: INPUT_P1_BUTTON2, name: "P1 Button 2" },
    InputButton { id: INPUT_P2_UP, name: "P2 Up" },
    InputButton { id: INPUT_P2_DOWN, name: "P2 Down" },
    InputButton { id: INPUT_P2_LEFT, name: "P2 Left" },
    InputButton { id: INPUT_P2_RIGHT, name: "P2 Right" },
    InputButton { id: INPUT_P2_BUTTON1, name: "P2 Button 1" },
    InputButton { id: INPUT_P2_BUTTON2, name: "P2 Button 2" },
    InputButton { id: INPUT_PAUSE, name: "Pause" },
    InputButton { id: INPUT_RESET, name: "Reset" },
];

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Wait-state model. The SMS inserts wait states on VDP port accesses; the
/// penalty and whether it shows up in reported cycle totals are tunable.
#[derive(Clone, Copy, Debug, Default)]
pub struct WaitConfig {
    pub sms_model: bool,
    pub include_wait_in_cycles: bool,
    pub vdp_penalty: u8,
}

/// Pre-instruction trace callback payload.
pub struct TraceEvent {
    pub pc: u16,
    pub opcode: u8,
    /// Populated when `trace_regs` is set.
    pub regs: Option<Z80State>,
}

pub struct TraceConfig {
    pub on_trace: Box<dyn FnMut(&TraceEvent)>,
    pub trace_regs: bool,
}

/// Construction-time machine configuration.
pub struct SmsConfig {
    pub cart: CartridgeImage,
    pub bios: Option<BiosImage>,
    pub allow_cart_ram: bool,
    pub region: Region,
    pub wait: WaitConfig,
    /// With no BIOS, pre-initialize CPU and VDP to the post-boot state
    /// (display enabled, VBlank IRQ enabled, IM 1).
    pub use_manual_init: bool,
    pub fast_blocks: bool,
    pub trace: Option<TraceConfig>,
}

impl SmsConfig {
    pub fn new(cart: CartridgeImage) -> Self {
        Self {
            cart,
            bios: None,
            allow_cart_ram: false,
            region: Region::Ntsc,
            wait: WaitConfig::default(),
            use_manual_init: true,
            fast_blocks: false,
            trace: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Joypads
// ---------------------------------------------------------------------------

/// Host-preset digital joypad state (true = pressed). The bus composes the
/// active-low port bytes from this between machine steps, so reads are
/// deterministic.
#[derive(Clone, Copy, Debug, Default)]
pub struct Joypad {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub button1: bool,
    pub button2: bool,
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

const WRAM_SIZE: usize = 0x2000;
const CART_RAM_SIZE: usize = 0x8000;

/// The SMS memory map and I/O decode: SEGA mapper over cartridge ROM, BIOS
/// overlay, mirrored work RAM, optional battery cart RAM, and the VDP/PSG/
/// controller port routing. Owns the devices so the CPU can borrow the
/// whole bus mutably without aliasing itself.
pub struct SmsBus {
    rom: Vec<u8>,
    bank_count: usize,
    wram: [u8; WRAM_SIZE],
    cart_ram: Vec<u8>,
    allow_cart_ram: bool,
    bios: Option<Vec<u8>>,

    /// Bank registers for slots 0/1/2 (0xFFFD/0xFFFE/0xFFFF), already
    /// reduced modulo the bank count.
    banks: [usize; 3],
    /// Mapper control byte (0xFFFC): bit 3 selects cart RAM into slot 2,
    /// bit 4 picks the RAM page.
    mapper_control: u8,
    /// Memory-control port (0x3E): bit 3 disables the BIOS overlay,
    /// bit 2 disables the I/O chip (controller reads).
    memory_control: u8,
    /// I/O-control port (0x3F): latched only.
    io_control: u8,

    pub vdp: SmsVdp,
    pub psg: Sn76489,
    pub pad1: Joypad,
    pub pad2: Joypad,
    /// Console reset button, reported active-low on port 0xDD bit 4.
    pub reset_button: bool,
}

impl SmsBus {
    fn new(
        rom: Vec<u8>,
        bios: Option<Vec<u8>>,
        allow_cart_ram: bool,
        vdp_config: VdpConfig,
        cpu_clock_hz: u64,
    ) -> Self {
        let bank_count = rom.len() / BANK_SIZE;
        Self {
            rom,
            bank_count,
            wram: [0; WRAM_SIZE],
            cart_ram: if allow_cart_ram {
                vec![0xFF; CART_RAM_SIZE]
            } else {
                Vec::new()
            },
            allow_cart_ram,
            bios,
            banks: [0, 1 % bank_count.max(1), 2 % bank_count.max(1)],
            mapper_control: 0,
            memory_control: 0,
            io_control: 0,
            vdp: SmsVdp::new(vdp_config),
            psg: Sn76489::new(cpu_clock_hz),
            pad1: Joypad::default(),
            pad2: Joypad::default(),
            reset_button: false,
        }
    }

    fn bios_active(&self) -> bool {
        self.bios.is_some() && (self.memory_control & 0x08) == 0
    }

    fn io_chip_disabled(&self) -> bool {
        (self.memory_control & 0x04) != 0
    }

    fn cart_ram_selected(&self) -> bool {
        (self.mapper_control & 0x08) != 0
    }

    fn cart_ram_offset(&self, addr: u16) -> usize {
        let page = if (self.mapper_control & 0x10) != 0 {
            0x4000
        } else {
            0
        };
        (page + ((addr as usize - 0x8000) & 0x3FFF)) & (CART_RAM_SIZE - 1)
    }

    fn rom_byte(&self, bank: usize, offset: usize) -> u8 {
        self.rom[bank * BANK_SIZE + offset]
    }

    fn write_mapper(&mut self, addr: u16, data: u8) {
        match addr {
            0xFFFC => self.mapper_control = data,
            0xFFFD => self.banks[0] = data as usize % self.bank_count,
            0xFFFE => self.banks[1] = data as usize % self.bank_count,
            0xFFFF => self.banks[2] = data as usize % self.bank_count,
            _ => {}
        }
    }

    /// Active-low pad 1 byte plus the first half of pad 2.
    fn port_dc(&self) -> u8 {
        let mut value = 0xFFu8;
        let mut clear = |bit: u8, pressed: bool| {
            if pressed {
                value &= !(1 << bit);
            }
        };
        clear(0, self.pad1.up);
        clear(1, self.pad1.down);
        clear(2, self.pad1.left);
        clear(3, self.pad1.right);
        clear(4, self.pad1.button1);
        clear(5, self.pad1.button2);
        clear(6, self.pad2.up);
        clear(7, self.pad2.down);
        value
    }

    /// Remaining pad 2 bits and the machine lines.
    fn port_dd(&self) -> u8 {
        let mut value = 0xFFu8;
        let mut clear = |bit: u8, pressed: bool| {
            if pressed {
                value &= !(1 << bit);
            }
        };
        clear(0, self.pad2.left);
        clear(1, self.pad2.right);
        clear(2, self.pad2.button1);
        clear(3, self.pad2.button2);
        clear(4, self.reset_button);
        value
    }

    pub fn wram(&self) -> &[u8] {
        &self.wram
    }

    pub fn cart_ram(&self) -> &[u8] {
        &self.cart_ram
    }

    pub fn cart_ram_mut(&mut self) -> &mut [u8] {
        &mut self.cart_ram
    }

    pub fn bank(&self, slot: usize) -> usize {
        self.banks[slot]
    }

    pub fn memory_control(&self) -> u8 {
        self.memory_control
    }
}

impl Bus for SmsBus {
    fn read(&mut self, addr: u16) -> u8 {
        match addr {
            // First KiB is always ROM bank 0, never mapped away.
            0x0000..=0x03FF => {
                if self.bios_active() {
                    if let Some(bios) = &self.bios {
                        if (addr as usize) < bios.len() {
                            return bios[addr as usize];
                        }
                    }
                }
                self.rom_byte(0, addr as usize)
            }
            0x0400..=0x3FFF => {
                if self.bios_active() {
                    if let Some(bios) = &self.bios {
                        if (addr as usize) < bios.len() {
                            return bios[addr as usize];
                        }
                    }
                }
                self.rom_byte(self.banks[0], (addr & 0x3FFF) as usize)
            }
            0x4000..=0x7FFF => self.rom_byte(self.banks[1], (addr - 0x4000) as usize),
            0x8000..=0xBFFF => {
                if self.cart_ram_selected() {
                    if self.allow_cart_ram {
                        self.cart_ram[self.cart_ram_offset(addr)]
                    } else {
                        0xFF // unmapped cart RAM
                    }
                } else {
                    self.rom_byte(self.banks[2], (addr - 0x8000) as usize)
                }
            }
            _ => self.wram[(addr & 0x1FFF) as usize],
        }
    }

    fn write(&mut self, addr: u16, data: u8) {
        match addr {
            0x8000..=0xBFFF => {
                if self.cart_ram_selected() && self.allow_cart_ram {
                    let offset = self.cart_ram_offset(addr);
                    self.cart_ram[offset] = data;
                }
                // ROM or unmapped cart RAM: ignored
            }
            0xC000..=0xFFFF => {
                self.wram[(addr & 0x1FFF) as usize] = data;
                if addr >= 0xFFFC {
                    self.write_mapper(addr, data);
                }
            }
            _ => {} // ROM: ignored
        }
    }

    fn io_read(&mut self, port: u16) -> u8 {
        match port as u8 {
            0x7E | 0x9E | 0x7F | 0x9F | 0xBE | 0xDE | 0xBF | 0xDF => {
                self.vdp.read_port(port as u8)
            }
            0xDC => {
                if self.io_chip_disabled() {
                    0xFF
                } else {
                    self.port_dc()
                }
            }
            0xDD => {
                if self.io_chip_disabled() {
                    0xFF
                } else {
                    self.port_dd()
                }
            }
            _ => 0xFF,
        }
    }

    fn io_write(&mut self, port: u16, data: u8) {
        match port as u8 {
            0x3E => self.memory_control = data,
            0x3F => self.io_control = data,
            0xBE | 0xDE | 0xBF | 0xDF => self.vdp.write_port(port as u8, data),
            0xDC | 0xDD => {} // controller ports are read-only
            // Canonical PSG port plus the documented odd-port mirrors.
            p if (p & 0x01) != 0 => self.psg.write(data),
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

/// Sega Master System (1985).
///
/// Hardware: Zilog Z80 @ 3.58 MHz, Sega 315-5124 VDP (TMS9918-derived,
/// Mode 4), SN76489 PSG, SEGA-mapper cartridge slot, two digital joypads.
/// Headless: the host drives time through `run_cycles`/`run_frame` and
/// pulls framebuffers and audio from the device snapshots.
pub struct SmsSystem {
    cpu: Z80,
    bus: SmsBus,
    region: Region,
    cpu_clock_hz: u64,
    cycles_per_frame: u64,
    use_manual_init: bool,
    clock: u64,
    trace: Option<TraceConfig>,
    last_error: Option<StepError>,
    pause_held: bool,
}

impl SmsSystem {
    pub fn new(config: SmsConfig) -> Self {
        let SmsConfig {
            cart,
            bios,
            allow_cart_ram,
            region,
            wait,
            use_manual_init,
            fast_blocks,
            trace,
        } = config;

        let (vdp_config, cpu_clock_hz) = match region {
            Region::Ntsc => (VdpConfig::ntsc(), NTSC_CPU_HZ),
            Region::Pal => (VdpConfig::pal(), PAL_CPU_HZ),
        };
        let cycles_per_frame =
            vdp_config.cycles_per_line as u64 * vdp_config.lines_per_frame as u64;

        let bus = SmsBus::new(
            cart.into_rom(),
            bios.map(BiosImage::into_data),
            allow_cart_ram,
            vdp_config,
            cpu_clock_hz,
        );

        let mut cpu = Z80::new();
        cpu.set_fast_blocks(fast_blocks);
        if wait.sms_model {
            let penalty = wait.vdp_penalty as u32;
            cpu.set_wait_state_hooks(Some(WaitHooks {
                mem: None,
                io: Some(Box::new(move |port| match port as u8 {
                    0xBE | 0xBF | 0xDE | 0xDF => penalty,
                    _ => 0,
                })),
                include_in_cycles: wait.include_wait_in_cycles,
            }));
        }

        let manual_init = use_manual_init && bus.bios.is_none();
        let mut system = Self {
            cpu,
            bus,
            region,
            cpu_clock_hz,
            cycles_per_frame,
            use_manual_init: manual_init,
            clock: 0,
            trace,
            last_error: None,
            pause_held: false,
        };
        system.power_on();
        system
    }

    /// Reach the standard post-BIOS state without a BIOS image: IM 1,
    /// stack in work RAM, display and VBlank IRQ enabled.
    fn apply_manual_init(&mut self) {
        self.cpu.sp = 0xDFF0;
        self.cpu.im = 1;

        let vdp = &mut self.bus.vdp;
        vdp.write_register(0, 0x36);
        vdp.write_register(1, 0xE0);
        vdp.write_register(2, 0xFF);
        vdp.write_register(3, 0xFF);
        vdp.write_register(4, 0xFF);
        vdp.write_register(5, 0xFF);
        vdp.write_register(6, 0xFB);
        vdp.write_register(7, 0x00);
        vdp.write_register(8, 0x00);
        vdp.write_register(9, 0x00);
        vdp.write_register(10, 0xFF);
    }

    fn power_on(&mut self) {
        self.cpu.reset();
        if self.use_manual_init {
            self.apply_manual_init();
        }
    }

    /// Run at least `n` CPU cycles (whole instructions). Each step ticks the
    /// VDP and PSG in lockstep with the CPU's reported T-states, then feeds
    /// the VDP's IRQ wire back into the CPU. Returns the cycles actually run.
    pub fn run_cycles(&mut self, n: u64) -> Result<u64, StepError> {
        let mut executed = 0u64;
        while executed < n {
            if let Some(trace) = self.trace.as_mut() {
                let pc = self.cpu.pc;
                let opcode = self.bus.read(pc);
                let event = TraceEvent {
                    pc,
                    opcode,
                    regs: if trace.trace_regs {
                        Some(self.cpu.snapshot())
                    } else {
                        None
                    },
                };
                (trace.on_trace)(&event);
            }

            let outcome = self.cpu.step_one(&mut self.bus)?;
            let t = outcome.cycles;
            self.bus.vdp.tick_cycles(t);
            self.bus.psg.tick_cycles(t);
            if self.bus.vdp.has_irq() {
                self.cpu.request_irq();
            } else {
                self.cpu.clear_irq();
            }
            executed += t as u64;
            self.clock += t as u64;
        }
        Ok(executed)
    }

    // --- Accessors ---

    pub fn cpu(&self) -> &Z80 {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Z80 {
        &mut self.cpu
    }

    pub fn cpu_state(&self) -> Z80State {
        self.cpu.snapshot()
    }

    pub fn vdp(&self) -> &SmsVdp {
        &self.bus.vdp
    }

    pub fn vdp_mut(&mut self) -> &mut SmsVdp {
        &mut self.bus.vdp
    }

    pub fn psg(&self) -> &Sn76489 {
        &self.bus.psg
    }

    pub fn psg_mut(&mut self) -> &mut Sn76489 {
        &mut self.bus.psg
    }

    pub fn bus(&self) -> &SmsBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut SmsBus {
        &mut self.bus
    }

    pub fn controller1_mut(&mut self) -> &mut Joypad {
        &mut self.bus.pad1
    }

    pub fn controller2_mut(&mut self) -> &mut Joypad {
        &mut self.bus.pad2
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Last hard fault from `run_frame`, if any (IM 0 misconfiguration).
    pub fn take_error(&mut self) -> Option<StepError> {
        self.last_error.take()
    }
}

impl Machine for SmsSystem {
    fn display_size(&self) -> (u32, u32) {
        (FRAME_WIDTH as u32, FRAME_HEIGHT as u32)
    }

    fn run_frame(&mut self) {
        if let Err(e) = self.run_cycles(self.cycles_per_frame) {
            self.last_error = Some(e);
        }
    }

    fn render_frame(&self, buffer: &mut [u8]) {
        self.bus.vdp.render_frame(buffer);
    }

    fn set_input(&mut self, button: u8, pressed: bool) {
        match button {
            INPUT_P1_UP => self.bus.pad1.up = pressed,
            INPUT_P1_DOWN => self.bus.pad1.down = pressed,
            INPUT_P1_LEFT => self.bus.pad1.left = pressed,
            INPUT_P1_RIGHT => self.bus.pad1.right = pressed,
            INPUT_P1_BUTTON1 => self.bus.pad1.button1 = pressed,
            INPUT_P1_BUTTON2 => self.bus.pad1.button2 = pressed,
            INPUT_P2_UP => self.bus.pad2.up = pressed,
            INPUT_P2_DOWN => self.bus.pad2.down = pressed,
            INPUT_P2_LEFT => self.bus.pad2.left = pressed,
            INPUT_P2_RIGHT => self.bus.pad2.right = pressed,
            INPUT_P2_BUTTON1 => self.bus.pad2.button1 = pressed,
            INPUT_P2_BUTTON2 => self.bus.pad2.button2 = pressed,
            INPUT_PAUSE => {
                // The pause button wires straight to the Z80 NMI line.
                if pressed && !self.pause_held {
                    self.cpu.request_nmi();
                }
                self.pause_held = pressed;
            }
            INPUT_RESET => self.bus.reset_button = pressed,
            _ => {}
        }
    }

    fn input_map(&self) -> &[InputButton] {
        SMS_INPUT_MAP
    }

    fn reset(&mut self) {
        self.bus.wram = [0; WRAM_SIZE];
        let bank_count = self.bus.bank_count.max(1);
        self.bus.banks = [0, 1 % bank_count, 2 % bank_count];
        self.bus.mapper_control = 0;
        self.bus.memory_control = 0;
        self.bus.io_control = 0;
        self.bus.reset_button = false;
        self.bus.pad1 = Joypad::default();
        self.bus.pad2 = Joypad::default();
        self.bus.vdp.reset();
        self.bus.psg.reset();
        self.clock = 0;
        self.last_error = None;
        self.pause_held = false;
        // Cart RAM survives reset (battery backed).
        self.power_on();
    }

    fn save_nvram(&self) -> Option<&[u8]> {
        if self.bus.allow_cart_ram {
            Some(&self.bus.cart_ram)
        } else {
            None
        }
    }

    fn load_nvram(&mut self, data: &[u8]) {
        if self.bus.allow_cart_ram {
            let n = data.len().min(self.bus.cart_ram.len());
            self.bus.cart_ram[..n].copy_from_slice(&data[..n]);
        }
    }

    fn fill_audio(&mut self, buffer: &mut [i16]) -> usize {
        self.bus.psg.fill_audio(buffer)
    }

    fn audio_sample_rate(&self) -> u32 {
        44_100
    }

    fn frame_rate_hz(&self) -> f64 {
        self.cpu_clock_hz as f64 / self.cycles_per_frame as f64
    }
}

// ---------------------------------------------------------------------------
// Registry entries
// ---------------------------------------------------------------------------

fn create_sms(region: Region, rom: Vec<u8>, bios: Option<Vec<u8>>) -> Result<Box<dyn Machine>, RomLoadError> {
    let cart = CartridgeImage::from_bytes(rom)?;
    let bios = bios.map(BiosImage::from_bytes).transpose()?;
    let mut config = SmsConfig::new(cart);
    config.region = region;
    config.use_manual_init = bios.is_none();
    config.bios = bios;
    config.allow_cart_ram = true;
    Ok(Box::new(SmsSystem::new(config)))
}

fn create_sms_ntsc(rom: Vec<u8>, bios: Option<Vec<u8>>) -> Result<Box<dyn Machine>, RomLoadError> {
    create_sms(Region::Ntsc, rom, bios)
}

fn create_sms_pal(rom: Vec<u8>, bios: Option<Vec<u8>>) -> Result<Box<dyn Machine>, RomLoadError> {
    create_sms(Region::Pal, rom, bios)
}

inventory::submit! {
    MachineEntry::new("sms", "Sega Master System (NTSC)", create_sms_ntsc)
}

inventory::submit! {
    MachineEntry::new("sms-pal", "Sega Master System (PAL)", create_sms_pal)
}
