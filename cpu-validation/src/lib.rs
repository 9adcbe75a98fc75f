//! Z80 single-step validation harness.
//!
//! Drives the interpreter against SingleStepTests-style JSON vectors:
//! each case carries a full initial register/RAM image, the expected
//! final image, and the per-T-state bus activity (used here for total
//! cycle counts). Vector files may be plain `.json` or gzipped
//! `.json.gz`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use mark3_core::core::Bus;
use serde::{Deserialize, Serialize};

// --- TracingBus: flat 64KB memory with access recording ---

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BusOp {
    Read,
    Write,
    In,
    Out,
}

#[derive(Clone, Debug)]
pub struct BusAccess {
    pub addr: u16,
    pub data: u8,
    pub op: BusOp,
}

/// Flat 64KB memory plus a queue of scripted I/O port responses.
pub struct TracingBus {
    pub memory: [u8; 0x10000],
    pub accesses: Vec<BusAccess>,
    /// Scripted responses for IN instructions: (port, data, direction).
    pub port_queue: Vec<(u16, u8, char)>,
}

impl TracingBus {
    pub fn new() -> Self {
        Self {
            memory: [0; 0x10000],
            accesses: Vec::new(),
            port_queue: Vec::new(),
        }
    }

    pub fn load(&mut self, addr: u16, data: &[u8]) {
        let start = addr as usize;
        self.memory[start..start + data.len()].copy_from_slice(data);
    }

    pub fn clear_accesses(&mut self) {
        self.accesses.clear();
    }
}

impl Default for TracingBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for TracingBus {
    fn read(&mut self, addr: u16) -> u8 {
        let data = self.memory[addr as usize];
        self.accesses.push(BusAccess {
            addr,
            data,
            op: BusOp::Read,
        });
        data
    }

    fn write(&mut self, addr: u16, data: u8) {
        self.memory[addr as usize] = data;
        self.accesses.push(BusAccess {
            addr,
            data,
            op: BusOp::Write,
        });
    }

    fn io_read(&mut self, port: u16) -> u8 {
        let data = self
            .port_queue
            .iter()
            .position(|&(p, _, dir)| p == port && dir == 'r')
            .map(|i| self.port_queue.remove(i).1)
            .unwrap_or(0xFF);
        self.accesses.push(BusAccess {
            addr: port,
            data,
            op: BusOp::In,
        });
        data
    }

    fn io_write(&mut self, port: u16, data: u8) {
        self.accesses.push(BusAccess {
            addr: port,
            data,
            op: BusOp::Out,
        });
    }
}

// --- JSON test vector types (SingleStepTests/z80 format) ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Z80TestCase {
    pub name: String,
    pub initial: Z80CpuState,
    #[serde(rename = "final")]
    pub final_state: Z80CpuState,
    /// Per-T-state bus activity; only the length is checked here.
    pub cycles: Vec<serde_json::Value>,
    #[serde(default)]
    pub ports: Vec<(u16, u8, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Z80CpuState {
    pub pc: u16,
    pub sp: u16,
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub f: u8,
    pub h: u8,
    pub l: u8,
    pub i: u8,
    pub r: u8,
    pub ix: u16,
    pub iy: u16,
    pub wz: u16,
    #[serde(rename = "af_")]
    pub af_prime: u16,
    #[serde(rename = "bc_")]
    pub bc_prime: u16,
    #[serde(rename = "de_")]
    pub de_prime: u16,
    #[serde(rename = "hl_")]
    pub hl_prime: u16,
    pub im: u8,
    pub iff1: u8,
    pub iff2: u8,
    pub ei: u8,
    #[serde(default)]
    pub p: u8,
    #[serde(default)]
    pub q: u8,
    pub ram: Vec<(u16, u8)>,
}

/// Load a vector file, transparently decompressing `.json.gz`.
pub fn load_test_file(path: &Path) -> std::io::Result<Vec<Z80TestCase>> {
    let mut raw = Vec::new();
    File::open(path)?.read_to_end(&mut raw)?;
    let text = if path.extension().is_some_and(|e| e == "gz") {
        let mut decoder = flate2::read::GzDecoder::new(raw.as_slice());
        let mut out = String::new();
        decoder.read_to_string(&mut out)?;
        out
    } else {
        String::from_utf8(raw).map_err(std::io::Error::other)?
    };
    serde_json::from_str(&text).map_err(std::io::Error::other)
}
