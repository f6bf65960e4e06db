//! In-memory device and resolver for tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use crate::device::{DeviceResolver, GattDevice};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect,
    Write(Uuid, Vec<u8>),
    Disconnect,
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct FakeError(&'static str);

#[derive(Debug, Clone, Default)]
struct Behaviour {
    connect_delay: Option<Duration>,
    write_delay: Option<Duration>,
    refuse_connect: bool,
    fail_writes_to: Option<Uuid>,
    fail_disconnect: bool,
}

#[derive(Debug, Default)]
struct State {
    events: Vec<Event>,
    connected: bool,
}

/// Records every link operation; clones share the same log
#[derive(Debug, Clone)]
pub struct FakeDevice {
    address: String,
    behaviour: Behaviour,
    state: Arc<Mutex<State>>,
}

impl FakeDevice {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            behaviour: Behaviour::default(),
            state: Arc::default(),
        }
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.behaviour.connect_delay = Some(delay);
        self
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.behaviour.write_delay = Some(delay);
        self
    }

    pub fn refuse_connect(mut self) -> Self {
        self.behaviour.refuse_connect = true;
        self
    }

    pub fn fail_writes_to(mut self, characteristic: Uuid) -> Self {
        self.behaviour.fail_writes_to = Some(characteristic);
        self
    }

    pub fn fail_disconnect(mut self) -> Self {
        self.behaviour.fail_disconnect = true;
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Write(uuid, payload) => Some((uuid, payload)),
                _ => None,
            })
            .collect()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    pub fn clear(&self) {
        self.state.lock().unwrap().events.clear();
    }

    fn record(&self, event: Event) {
        self.state.lock().unwrap().events.push(event);
    }
}

impl GattDevice for FakeDevice {
    type Error = FakeError;

    fn address(&self) -> String {
        self.address.clone()
    }

    async fn connect(&self) -> Result<(), FakeError> {
        if let Some(delay) = self.behaviour.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.behaviour.refuse_connect {
            return Err(FakeError("connection refused"));
        }
        self.record(Event::Connect);
        self.state.lock().unwrap().connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), FakeError> {
        self.record(Event::Disconnect);
        self.state.lock().unwrap().connected = false;
        if self.behaviour.fail_disconnect {
            return Err(FakeError("already gone"));
        }
        Ok(())
    }

    async fn write(&self, characteristic: Uuid, payload: &[u8]) -> Result<(), FakeError> {
        if let Some(delay) = self.behaviour.write_delay {
            tokio::time::sleep(delay).await;
        }
        if !self.is_connected() {
            return Err(FakeError("not connected"));
        }
        if self.behaviour.fail_writes_to == Some(characteristic) {
            return Err(FakeError("write rejected"));
        }
        self.record(Event::Write(characteristic, payload.to_vec()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeResolver {
    devices: Vec<FakeDevice>,
    broken: bool,
}

impl FakeResolver {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with(device: FakeDevice) -> Self {
        Self {
            devices: vec![device],
            broken: false,
        }
    }

    pub fn broken() -> Self {
        Self {
            devices: Vec::new(),
            broken: true,
        }
    }
}

impl DeviceResolver for FakeResolver {
    type Device = FakeDevice;
    type Error = FakeError;

    async fn resolve(&self, address: &str) -> Result<Option<FakeDevice>, FakeError> {
        if self.broken {
            return Err(FakeError("adapter unavailable"));
        }
        Ok(self
            .devices
            .iter()
            .find(|device| device.address == address)
            .cloned())
    }
}
