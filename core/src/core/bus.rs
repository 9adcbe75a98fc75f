/// Generic 8-bit bus interface with a separate I/O port address space.
///
/// The Z80 drives two address spaces: 64KB of memory and 256 ports. The
/// full 16-bit port address is passed through because some hardware decodes
/// A8-A15 as well (IN A,(n) puts A on the upper half of the address bus).
pub trait Bus {
    fn read(&mut self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, data: u8);

    /// Read from the I/O port space. Default is open bus (0xFF).
    fn io_read(&mut self, port: u16) -> u8 {
        let _ = port;
        0xFF
    }

    /// Write to the I/O port space. Default discards.
    fn io_write(&mut self, port: u16, data: u8) {
        let _ = (port, data);
    }
}
