//! SparkFun QwiicRF LoRa module, driven over its I2C command interface.

use core::fmt;

use embedded_hal::i2c::I2c;
use heapless::Vec;

pub const DEFAULT_ADDRESS: u8 = 0x35;

/// Largest write the module firmware accepts, command byte included.
pub const MAX_FRAME: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    GetStatus = 0x01,
    Send = 0x02,
    SendReliable = 0x03,
    SetReliableTimeout = 0x04,
    GetPayload = 0x05,
    SetSpreadFactor = 0x06,
    SetSyncWord = 0x07,
    SetRfAddress = 0x08,
    GetRfAddress = 0x09,
    GetPacketRssi = 0x0A,
    GetPayloadSize = 0x0B,
    GetPacketSender = 0x0C,
    GetPacketRecipient = 0x0D,
    GetPacketSnr = 0x0E,
    GetPacketId = 0x0F,
    SetTxPower = 0x10,
    GetSyncWord = 0x11,
    SetPairedAddress = 0x12,
    GetPairedAddress = 0x13,
    SendPaired = 0x20,
}

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    I2c(E),
    /// Empty payload.
    InvalidArgument,
    /// Payload plus header does not fit in one I2C frame.
    PayloadTooLarge,
}

impl<E> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::I2c(e)
    }
}

pub struct QwiicRf<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> QwiicRf<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Pokes the module once. A missing module only shows up on the next
    /// real transfer.
    pub fn init(&mut self) {
        let _ = self.packet_available();
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    /// Sends to the paired address.
    pub fn send_packet(&mut self, data: &[u8]) -> Result<(), Error<I2C::Error>> {
        self.send_frame(&[Command::SendPaired as u8], data)
    }

    pub fn send_packet_to(&mut self, rf_address: u8, data: &[u8]) -> Result<(), Error<I2C::Error>> {
        self.send_frame(&[Command::Send as u8, rf_address], data)
    }

    /// Size of the buffered payload, `0` when nothing arrived.
    pub fn packet_available(&mut self) -> Result<usize, Error<I2C::Error>> {
        Ok(usize::from(self.query(Command::GetPayloadSize)?))
    }

    /// Reads the buffered payload into `buf`, truncated to its length.
    /// Returns the number of bytes written.
    pub fn read_packet(&mut self, buf: &mut [u8]) -> Result<usize, Error<I2C::Error>> {
        let available = self.packet_available()?;
        let n = available.min(buf.len());
        if n == 0 {
            return Ok(0);
        }
        self.i2c
            .write_read(self.address, &[Command::GetPayload as u8], &mut buf[..n])?;
        Ok(n)
    }

    pub fn set_rf_address(&mut self, address: u8) -> Result<(), Error<I2C::Error>> {
        self.command(Command::SetRfAddress, address)
    }

    pub fn rf_address(&mut self) -> Result<u8, Error<I2C::Error>> {
        self.query(Command::GetRfAddress)
    }

    pub fn set_paired_address(&mut self, address: u8) -> Result<(), Error<I2C::Error>> {
        self.command(Command::SetPairedAddress, address)
    }

    pub fn paired_address(&mut self) -> Result<u8, Error<I2C::Error>> {
        self.query(Command::GetPairedAddress)
    }

    pub fn set_sync_word(&mut self, word: u8) -> Result<(), Error<I2C::Error>> {
        self.command(Command::SetSyncWord, word)
    }

    pub fn sync_word(&mut self) -> Result<u8, Error<I2C::Error>> {
        self.query(Command::GetSyncWord)
    }

    pub fn set_spread_factor(&mut self, factor: u8) -> Result<(), Error<I2C::Error>> {
        self.command(Command::SetSpreadFactor, factor)
    }

    pub fn set_tx_power(&mut self, dbm: u8) -> Result<(), Error<I2C::Error>> {
        self.command(Command::SetTxPower, dbm)
    }

    /// RF address of the node that sent the last packet.
    pub fn packet_sender(&mut self) -> Result<u8, Error<I2C::Error>> {
        self.query(Command::GetPacketSender)
    }

    fn send_frame(&mut self, header: &[u8], data: &[u8]) -> Result<(), Error<I2C::Error>> {
        if data.is_empty() {
            return Err(Error::InvalidArgument);
        }
        let mut frame: Vec<u8, MAX_FRAME> = Vec::new();
        frame
            .extend_from_slice(header)
            .and_then(|()| frame.extend_from_slice(data))
            .map_err(|_| Error::PayloadTooLarge)?;
        self.i2c.write(self.address, &frame)?;
        Ok(())
    }

    fn command(&mut self, command: Command, value: u8) -> Result<(), Error<I2C::Error>> {
        self.i2c.write(self.address, &[command as u8, value])?;
        Ok(())
    }

    fn query(&mut self, command: Command) -> Result<u8, Error<I2C::Error>> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[command as u8], &mut buf)?;
        Ok(buf[0])
    }
}

/// Reads seen on an idle or unpowered module rather than real packets.
pub fn is_noise(payload: &[u8]) -> bool {
    let all_ff = !payload.is_empty() && payload.iter().all(|&b| b == 0xFF);
    all_ff || payload == [0x03, 0xFF, 0xFF]
}

/// `[len] XX XX ..`
pub struct HexDump<'a>(pub &'a [u8]);

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.len())?;
        for byte in self.0 {
            write!(f, " {byte:02X}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BusOp, FakeI2c};
    use std::string::ToString;

    #[test]
    fn send_paired_frame_layout() {
        let mut rf = QwiicRf::new(FakeI2c::new());
        rf.send_packet(b"Hello").unwrap();
        assert_eq!(
            rf.release().ops,
            vec![BusOp::Write(DEFAULT_ADDRESS, b"\x20Hello".to_vec())]
        );
    }

    #[test]
    fn send_to_address_frame_layout() {
        let mut rf = QwiicRf::new(FakeI2c::new());
        rf.send_packet_to(0x01, b"Hi").unwrap();
        assert_eq!(rf.release().writes(), vec![vec![0x02, 0x01, b'H', b'i']]);
    }

    #[test]
    fn empty_payload_is_rejected() {
        let mut rf = QwiicRf::new(FakeI2c::new());
        assert!(matches!(rf.send_packet(&[]), Err(Error::InvalidArgument)));
        assert!(matches!(rf.send_packet_to(1, &[]), Err(Error::InvalidArgument)));
        assert!(rf.release().ops.is_empty());
    }

    #[test]
    fn oversize_payload_is_rejected() {
        let mut rf = QwiicRf::new(FakeI2c::new());
        assert!(rf.send_packet(&[0xAA; MAX_FRAME - 1]).is_ok());
        assert!(matches!(
            rf.send_packet(&[0xAA; MAX_FRAME]),
            Err(Error::PayloadTooLarge)
        ));
        assert!(matches!(
            rf.send_packet_to(1, &[0xAA; MAX_FRAME - 1]),
            Err(Error::PayloadTooLarge)
        ));
    }

    #[test]
    fn read_packet_queries_size_then_payload() {
        let mut i2c = FakeI2c::new();
        i2c.respond(&[4]);
        i2c.respond(b"ping");
        let mut rf = QwiicRf::new(i2c);

        let mut buf = [0u8; 16];
        assert_eq!(rf.read_packet(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"ping");
        assert_eq!(
            rf.release().ops,
            vec![
                BusOp::Write(DEFAULT_ADDRESS, vec![0x0B]),
                BusOp::Read(DEFAULT_ADDRESS, 1),
                BusOp::Write(DEFAULT_ADDRESS, vec![0x05]),
                BusOp::Read(DEFAULT_ADDRESS, 4),
            ]
        );
    }

    #[test]
    fn read_packet_is_capped_by_buffer() {
        let mut i2c = FakeI2c::new();
        i2c.respond(&[10]);
        i2c.respond(b"0123456789");
        let mut rf = QwiicRf::new(i2c);

        let mut buf = [0u8; 3];
        assert_eq!(rf.read_packet(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"012");
        assert_eq!(rf.release().ops.last(), Some(&BusOp::Read(DEFAULT_ADDRESS, 3)));
    }

    #[test]
    fn nothing_buffered_reads_zero() {
        let mut i2c = FakeI2c::new();
        i2c.respond(&[0]);
        let mut rf = QwiicRf::new(i2c);
        assert_eq!(rf.read_packet(&mut [0u8; 8]).unwrap(), 0);
        assert_eq!(rf.release().ops.len(), 2);
    }

    #[test]
    fn address_setters_and_getters() {
        let mut i2c = FakeI2c::new();
        i2c.respond(&[0x02]);
        let mut rf = QwiicRf::new(i2c);
        rf.set_rf_address(0x02).unwrap();
        rf.set_paired_address(0x01).unwrap();
        assert_eq!(rf.rf_address().unwrap(), 0x02);
        assert_eq!(
            rf.release().writes(),
            vec![vec![0x08, 0x02], vec![0x12, 0x01], vec![0x09]]
        );
    }

    #[test]
    fn init_ignores_bus_errors() {
        let mut i2c = FakeI2c::new();
        i2c.nack = true;
        let mut rf = QwiicRf::new(i2c);
        rf.init();
        assert!(matches!(rf.packet_available(), Err(Error::I2c(_))));
    }

    #[test]
    fn noise_filter() {
        assert!(is_noise(&[0xFF]));
        assert!(is_noise(&[0xFF; 12]));
        assert!(is_noise(&[0x03, 0xFF, 0xFF]));
        assert!(!is_noise(&[0x03, 0xFF]));
        assert!(!is_noise(b"Hello"));
        assert!(!is_noise(&[]));
    }

    #[test]
    fn hex_dump_format() {
        assert_eq!(HexDump(&[0x48, 0x0A, 0xFF]).to_string(), "[3] 48 0A FF");
        assert_eq!(HexDump(&[]).to_string(), "[0]");
    }
}
