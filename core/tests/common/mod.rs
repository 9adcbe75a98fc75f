use mark3_core::core::Bus;
use mark3_core::cpu::z80::Z80;

/// Minimal bus for testing: flat 64KB read/write memory plus a simple
/// I/O port space (per-port input bytes, last output recorded).
pub struct TestBus {
    pub memory: [u8; 0x10000],
    pub ports_in: [u8; 256],
    pub outputs: Vec<(u16, u8)>,
}

impl TestBus {
    pub fn new() -> Self {
        Self {
            memory: [0; 0x10000],
            ports_in: [0xFF; 256],
            outputs: Vec::new(),
        }
    }

    pub fn load(&mut self, addr: u16, data: &[u8]) {
        let start = addr as usize;
        self.memory[start..start + data.len()].copy_from_slice(data);
    }
}

impl Bus for TestBus {
    fn read(&mut self, addr: u16) -> u8 {
        self.memory[addr as usize]
    }

    fn write(&mut self, addr: u16, data: u8) {
        self.memory[addr as usize] = data;
    }

    fn io_read(&mut self, port: u16) -> u8 {
        self.ports_in[(port & 0xFF) as usize]
    }

    fn io_write(&mut self, port: u16, data: u8) {
        self.outputs.push((port, data));
    }
}

/// Step one instruction, panicking on configuration faults.
#[allow(dead_code)]
pub fn step(cpu: &mut Z80, bus: &mut TestBus) -> u32 {
    cpu.step_one(bus).expect("step failed").cycles
}
