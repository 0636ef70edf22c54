use embedded_hal::i2c::{self, ErrorKind, ErrorType, NoAcknowledgeSource, Operation};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, PartialEq)]
pub enum Error {
    Nack,
}

impl i2c::Error for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Nack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
        }
    }
}

/// A single device on a fake bus.
///
/// A one-byte write followed by a read in the same transaction reads from the register map, the
/// way `write_read` addresses a register. Any other read takes the next queued response. Every
/// write is logged.
#[derive(Debug)]
pub struct I2c {
    address: u8,
    registers: HashMap<u8, Vec<u8>>,
    responses: VecDeque<Vec<u8>>,
    writes: Vec<Vec<u8>>,
    failures: usize,
}

impl I2c {
    pub fn new(address: u8) -> I2c {
        I2c {
            address,
            registers: HashMap::new(),
            responses: VecDeque::new(),
            writes: Vec::new(),
            failures: 0,
        }
    }

    /// Sets the bytes read starting at `register`.
    pub fn set_register(&mut self, register: u8, bytes: &[u8]) {
        self.registers.insert(register, bytes.to_vec());
    }

    pub fn queue_response(&mut self, bytes: &[u8]) {
        self.responses.push_back(bytes.to_vec());
    }

    /// Makes the next `count` transactions fail to acknowledge.
    pub fn fail_next(&mut self, count: usize) {
        self.failures = count;
    }

    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    pub fn pending_responses(&self) -> usize {
        self.responses.len()
    }
}

impl ErrorType for I2c {
    type Error = Error;
}

impl i2c::I2c for I2c {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(Error::Nack);
        }
        if address != self.address {
            return Err(Error::Nack);
        }

        let mut register = None;
        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => {
                    self.writes.push(bytes.to_vec());
                    register = if bytes.len() == 1 { Some(bytes[0]) } else { None };
                }
                Operation::Read(buffer) => {
                    let source = match register {
                        Some(register) => self.registers.get(&register).cloned(),
                        None => self.responses.pop_front(),
                    };
                    let source = source.ok_or(Error::Nack)?;
                    for (byte, value) in buffer.iter_mut().zip(source.iter()) {
                        *byte = *value;
                    }
                }
            }
        }
        Ok(())
    }
}
