//! Fake buses and pins for the host unit tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::convert::Infallible;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType as PinErrorType, InputPin, OutputPin, StatefulOutputPin};
use embedded_hal::i2c::{self, ErrorKind, I2c, NoAcknowledgeSource, Operation};
use embedded_hal::pwm::{ErrorType as PwmErrorType, SetDutyCycle};
use embedded_sdmmc::{Block, BlockCount, BlockDevice, BlockIdx};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    Write(u8, Vec<u8>),
    Read(u8, usize),
}

/// Register-file I2C device.
///
/// A single written byte moves the register pointer; reads stream from the
/// pointer unless a canned response is queued. With `paired_writes` every
/// longer write is taken as `reg, value, reg, value, ..` (BME68x style).
pub struct FakeI2c {
    pub regs: [u8; 256],
    pub pointer: u8,
    pub paired_writes: bool,
    pub responses: VecDeque<Vec<u8>>,
    pub ops: Vec<BusOp>,
    pub nack: bool,
}

impl FakeI2c {
    pub fn new() -> Self {
        Self {
            regs: [0; 256],
            pointer: 0,
            paired_writes: false,
            responses: VecDeque::new(),
            ops: Vec::new(),
            nack: false,
        }
    }

    pub fn with_paired_writes() -> Self {
        Self {
            paired_writes: true,
            ..Self::new()
        }
    }

    pub fn respond(&mut self, bytes: &[u8]) {
        self.responses.push_back(bytes.to_vec());
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                BusOp::Write(_, bytes) => Some(bytes.clone()),
                BusOp::Read(..) => None,
            })
            .collect()
    }
}

impl i2c::ErrorType for FakeI2c {
    type Error = ErrorKind;
}

impl I2c for FakeI2c {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if self.nack {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for op in operations {
            match op {
                Operation::Write(bytes) => {
                    self.ops.push(BusOp::Write(address, bytes.to_vec()));
                    if let Some(&first) = bytes.first() {
                        self.pointer = first;
                    }
                    if self.paired_writes && bytes.len() >= 2 {
                        for pair in bytes.chunks_exact(2) {
                            self.regs[pair[0] as usize] = pair[1];
                        }
                    }
                }
                Operation::Read(buf) => {
                    self.ops.push(BusOp::Read(address, buf.len()));
                    if let Some(canned) = self.responses.pop_front() {
                        let n = canned.len().min(buf.len());
                        buf[..n].copy_from_slice(&canned[..n]);
                    } else {
                        for byte in buf.iter_mut() {
                            *byte = self.regs[self.pointer as usize];
                            self.pointer = self.pointer.wrapping_add(1);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDelay {
    pub total_ns: u64,
}

impl DelayNs for FakeDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }
}

#[derive(Default)]
pub struct FakePin {
    pub high: bool,
    pub history: Vec<bool>,
}

impl FakePin {
    pub fn low() -> Self {
        Self::default()
    }

    pub fn high() -> Self {
        Self {
            high: true,
            history: Vec::new(),
        }
    }
}

impl PinErrorType for FakePin {
    type Error = Infallible;
}

impl OutputPin for FakePin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        self.history.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        self.history.push(true);
        Ok(())
    }
}

impl StatefulOutputPin for FakePin {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.high)
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.high)
    }
}

impl InputPin for FakePin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.high)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.high)
    }
}

pub struct FakePwm {
    pub max: u16,
    pub duty: u16,
}

impl FakePwm {
    pub fn new(max: u16) -> Self {
        Self { max, duty: 0 }
    }
}

impl PwmErrorType for FakePwm {
    type Error = Infallible;
}

impl SetDutyCycle for FakePwm {
    fn max_duty_cycle(&self) -> u16 {
        self.max
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        self.duty = duty;
        Ok(())
    }
}

/// Sparse in-memory block device; unwritten blocks read as zeros.
pub struct RamDisk {
    blocks: RefCell<BTreeMap<u32, [u8; Block::LEN]>>,
    num_blocks: u32,
}

impl RamDisk {
    const PARTITION_START: u32 = 1;
    const RESERVED: u16 = 1;
    const FAT_BLOCKS: u16 = 20;
    const ROOT_ENTRIES: u16 = 512;
    // Enough clusters (one block each) that the volume counts as FAT16.
    const VOLUME_BLOCKS: u16 = 4400;

    /// An MBR disk with one freshly formatted, empty FAT16 partition.
    pub fn fat16() -> Self {
        let disk = Self {
            blocks: RefCell::new(BTreeMap::new()),
            num_blocks: Self::PARTITION_START + u32::from(Self::VOLUME_BLOCKS),
        };

        let mut mbr = [0u8; Block::LEN];
        let entry = &mut mbr[446..462];
        entry[4] = 0x06;
        entry[8..12].copy_from_slice(&Self::PARTITION_START.to_le_bytes());
        entry[12..16].copy_from_slice(&u32::from(Self::VOLUME_BLOCKS).to_le_bytes());
        mbr[510] = 0x55;
        mbr[511] = 0xAA;
        disk.put(0, mbr);

        let mut bpb = [0u8; Block::LEN];
        bpb[0..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
        bpb[3..11].copy_from_slice(b"RAMDISK ");
        bpb[11..13].copy_from_slice(&512u16.to_le_bytes());
        bpb[13] = 1;
        bpb[14..16].copy_from_slice(&Self::RESERVED.to_le_bytes());
        bpb[16] = 1;
        bpb[17..19].copy_from_slice(&Self::ROOT_ENTRIES.to_le_bytes());
        bpb[19..21].copy_from_slice(&Self::VOLUME_BLOCKS.to_le_bytes());
        bpb[21] = 0xF8;
        bpb[22..24].copy_from_slice(&Self::FAT_BLOCKS.to_le_bytes());
        bpb[43..54].copy_from_slice(b"NO NAME    ");
        bpb[54..62].copy_from_slice(b"FAT16   ");
        bpb[510] = 0x55;
        bpb[511] = 0xAA;
        disk.put(Self::PARTITION_START, bpb);

        // Media descriptor and end-of-chain markers for clusters 0 and 1.
        let mut fat = [0u8; Block::LEN];
        fat[0..4].copy_from_slice(&[0xF8, 0xFF, 0xFF, 0xFF]);
        disk.put(Self::PARTITION_START + u32::from(Self::RESERVED), fat);

        disk
    }

    fn put(&self, idx: u32, data: [u8; Block::LEN]) {
        self.blocks.borrow_mut().insert(idx, data);
    }
}

#[derive(Debug)]
pub struct OutOfRange;

impl BlockDevice for RamDisk {
    type Error = OutOfRange;

    fn read(&self, blocks: &mut [Block], start_block_idx: BlockIdx) -> Result<(), Self::Error> {
        let stored = self.blocks.borrow();
        for (i, block) in blocks.iter_mut().enumerate() {
            let idx = start_block_idx.0 + i as u32;
            if idx >= self.num_blocks {
                return Err(OutOfRange);
            }
            block.contents = stored.get(&idx).copied().unwrap_or([0; Block::LEN]);
        }
        Ok(())
    }

    fn write(&self, blocks: &[Block], start_block_idx: BlockIdx) -> Result<(), Self::Error> {
        for (i, block) in blocks.iter().enumerate() {
            let idx = start_block_idx.0 + i as u32;
            if idx >= self.num_blocks {
                return Err(OutOfRange);
            }
            self.put(idx, block.contents);
        }
        Ok(())
    }

    fn num_blocks(&self) -> Result<BlockCount, Self::Error> {
        Ok(BlockCount(self.num_blocks))
    }
}
