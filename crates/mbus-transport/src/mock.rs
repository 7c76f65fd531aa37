use crate::{Address, DataRecord, MbusMaster, Reading, Result, TransportError};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Observable side effects of a [`MockMaster`], in call order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MasterEvent {
    Connect,
    GetReading(Address),
    Close,
}

/// Shared, cloneable view of everything a mock master was asked to do.
#[derive(Clone, Debug, Default)]
pub struct Journal(Arc<Mutex<Vec<MasterEvent>>>);

impl Journal {
    fn push(&self, event: MasterEvent) {
        if let Ok(mut events) = self.0.lock() {
            events.push(event);
        }
    }

    pub fn events(&self) -> Vec<MasterEvent> {
        self.0.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn reads_of(&self, address: &Address) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, MasterEvent::GetReading(a) if a == address))
            .count()
    }
}

/// A scriptable in-process master.
///
/// Each address has a queue of scripted responses. Once the queue is drained the
/// address keeps answering with its steady reading, or `NoResponse` if none is set.
#[derive(Default)]
pub struct MockMaster {
    connected: bool,
    scripted: HashMap<Address, VecDeque<Result<Reading>>>,
    steady: HashMap<Address, Reading>,
    latency: Option<Duration>,
    journal: Journal,
}

impl MockMaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// A master where every address answers with a small water meter reading.
    pub fn demo(addresses: &[Address]) -> Self {
        let mut master = Self::new();
        for (i, addr) in addresses.iter().enumerate() {
            let reading = Reading::default()
                .with_info("Manufacturer", "ACW")
                .with_info("Medium", "Water")
                .with_info("Id", 11_490_378 + i as i64)
                .with_record(DataRecord::new(0, 11_490_378 + i as i64, "Fabrication number"))
                .with_record(DataRecord::new(1, 1500, "Volume (1e-3 m^3)"))
                .with_record(DataRecord::new(2, 0, "Status"));
            master.steady.insert(addr.clone(), reading);
        }
        master
    }

    pub fn with_reading(mut self, address: Address, reading: Reading) -> Self {
        self.steady.insert(address, reading);
        self
    }

    /// Block every read for `latency`, like a slow bus.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue a one-off response ahead of the steady reading.
    pub fn push_response(&mut self, address: Address, response: Result<Reading>) {
        self.scripted.entry(address).or_default().push_back(response);
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }
}

impl MbusMaster for MockMaster {
    fn connect(&mut self) -> Result<()> {
        self.journal.push(MasterEvent::Connect);
        self.connected = true;
        Ok(())
    }

    fn get_reading(&mut self, address: &Address) -> Result<Reading> {
        self.journal.push(MasterEvent::GetReading(address.clone()));
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }
        if let Some(next) = self.scripted.get_mut(address).and_then(VecDeque::pop_front) {
            return next.map(Reading::stamped_now);
        }
        self.steady
            .get(address)
            .cloned()
            .map(Reading::stamped_now)
            .ok_or_else(|| TransportError::NoResponse(address.clone()))
    }

    fn close(&mut self) -> Result<()> {
        self.journal.push(MasterEvent::Close);
        self.connected = false;
        Ok(())
    }
}
