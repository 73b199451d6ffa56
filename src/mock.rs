//! Test doubles for the controller, the network stack, and the kernel
//!
//! Every mock shares its state through an `Arc`, so a test keeps a handle
//! after giving the mock to the driver. Inspect state with the `with()`
//! helpers; never hold a mock's lock while calling into the driver.

use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex},
    vec::Vec,
};

use usb_device::{
    control::{Recipient, Request, RequestType},
    endpoint::{EndpointAddress, EndpointType},
    UsbDirection, UsbError,
};

use crate::{
    config::{Config, DeviceInfo},
    ecm::CdcEcm,
    error::{Error, Result},
    netdev::{LinkType, NetDev, NetStack, Network},
    permit::{Interrupted, Semaphore},
    usbdev::{Rejected, RequestFlags, Speed, TransferError, UsbDevice, UsbRequest},
    work::{Kernel, Work},
    ClassDriver,
};

pub const EP0: u8 = 0x80;
pub const INT_IN: u8 = 0x81;
pub const BULK_IN: u8 = 0x82;
pub const BULK_OUT: u8 = 0x03;

/// Something the driver asked of the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    AllocEp(u8),
    FreeEp(u8),
    AllocRequest(u8),
    FreeRequest(u8),
    Configure { addr: u8, last: bool, descriptor: Vec<u8> },
    Disable(u8),
    Submit { addr: u8, len: usize },
    Connect,
    SelfPowered,
}

#[derive(Debug)]
pub struct MockRequest {
    addr: u8,
    buf: Vec<u8>,
    len: usize,
    flags: RequestFlags,
    transferred: usize,
    result: core::result::Result<(), TransferError>,
}

impl MockRequest {
    pub fn addr(&self) -> u8 {
        self.addr
    }

    pub fn flags(&self) -> RequestFlags {
        self.flags
    }

    /// Finish the transfer, moving the whole requested length
    pub fn succeed(mut self) -> Self {
        self.transferred = self.len;
        self.result = Ok(());
        self
    }

    /// Finish an OUT transfer that carried `data`
    pub fn receive(mut self, data: &[u8]) -> Self {
        self.buf[..data.len()].copy_from_slice(data);
        self.transferred = data.len();
        self.result = Ok(());
        self
    }

    pub fn fail(mut self, result: TransferError) -> Self {
        self.transferred = 0;
        self.result = Err(result);
        self
    }

    /// The bytes a finished IN transfer sent
    pub fn data(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl UsbRequest for MockRequest {
    fn buf(&self) -> &[u8] {
        &self.buf
    }
    fn buf_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
    fn len(&self) -> usize {
        self.len
    }
    fn set_len(&mut self, len: usize) {
        self.len = len;
    }
    fn set_flags(&mut self, flags: RequestFlags) {
        self.flags = flags;
    }
    fn transferred(&self) -> usize {
        self.transferred
    }
    fn result(&self) -> core::result::Result<(), TransferError> {
        self.result
    }
    fn set_result(&mut self, result: core::result::Result<(), TransferError>) {
        self.result = result;
    }
}

#[derive(Debug)]
pub struct MockEndpoint {
    addr: u8,
}

pub struct UsbState {
    pub speed: Speed,
    pub events: Vec<Event>,
    /// Requests that the controller holds, with their endpoint address
    pub queued: Vec<MockRequest>,
    pub enabled: Vec<u8>,
    /// Submissions on these endpoints are rejected
    pub reject: Vec<u8>,
    pub fail_configure: Option<u8>,
    pub missing_ep: Option<u8>,
    pub fail_alloc_request: Option<u8>,
    pub live_requests: usize,
}

#[derive(Clone)]
pub struct MockUsb {
    state: Arc<Mutex<UsbState>>,
}

impl MockUsb {
    pub fn new(speed: Speed) -> Self {
        MockUsb {
            state: Arc::new(Mutex::new(UsbState {
                speed,
                events: Vec::new(),
                queued: Vec::new(),
                enabled: Vec::new(),
                reject: Vec::new(),
                fail_configure: None,
                missing_ep: None,
                fail_alloc_request: None,
                live_requests: 0,
            })),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut UsbState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn events(&self) -> Vec<Event> {
        self.with(|state| state.events.clone())
    }

    pub fn clear_events(&self) {
        self.with(|state| state.events.clear());
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.with(|state| state.events.iter().filter(|event| predicate(event)).count())
    }

    pub fn submits(&self, addr: u8) -> usize {
        self.count(|event| matches!(event, Event::Submit { addr: a, .. } if *a == addr))
    }

    /// Take back the request queued on `addr`
    pub fn take(&self, addr: u8) -> Option<MockRequest> {
        self.with(|state| {
            let position = state.queued.iter().position(|req| req.addr == addr)?;
            Some(state.queued.remove(position))
        })
    }

    pub fn is_queued(&self, addr: u8) -> bool {
        self.with(|state| state.queued.iter().any(|req| req.addr == addr))
    }

    fn submit_to(&mut self, addr: u8, req: MockRequest) -> core::result::Result<(), Rejected<MockRequest>> {
        self.with(|state| {
            let enabled = addr == EP0 || state.enabled.contains(&addr);
            if !enabled || state.reject.contains(&addr) {
                return Err(Rejected {
                    error: UsbError::InvalidEndpoint,
                    request: req,
                });
            }
            state.events.push(Event::Submit { addr, len: req.len });
            state.queued.push(req);
            Ok(())
        })
    }
}

impl UsbDevice for MockUsb {
    type Endpoint = MockEndpoint;
    type Request = MockRequest;

    fn speed(&self) -> Speed {
        self.with(|state| state.speed)
    }

    fn alloc_ep(&mut self, addr: EndpointAddress, _: EndpointType) -> Option<MockEndpoint> {
        let addr = u8::from(addr);
        self.with(|state| {
            state.events.push(Event::AllocEp(addr));
            (state.missing_ep != Some(addr)).then_some(MockEndpoint { addr })
        })
    }

    fn free_ep(&mut self, ep: MockEndpoint) {
        self.with(|state| state.events.push(Event::FreeEp(ep.addr)));
    }

    fn alloc_request(&mut self, addr: EndpointAddress, len: usize) -> Option<MockRequest> {
        let addr = u8::from(addr);
        self.with(|state| {
            state.events.push(Event::AllocRequest(addr));
            if state.fail_alloc_request == Some(addr) {
                return None;
            }
            state.live_requests += 1;
            Some(MockRequest {
                addr,
                buf: std::vec![0; len],
                len: 0,
                flags: RequestFlags::empty(),
                transferred: 0,
                result: Ok(()),
            })
        })
    }

    fn free_request(&mut self, addr: EndpointAddress, req: MockRequest) {
        assert_eq!(u8::from(addr), req.addr);
        self.with(|state| {
            state.live_requests -= 1;
            state.events.push(Event::FreeRequest(req.addr));
        });
    }

    fn configure(
        &mut self,
        ep: &mut MockEndpoint,
        descriptor: &[u8],
        last: bool,
    ) -> core::result::Result<(), UsbError> {
        self.with(|state| {
            state.events.push(Event::Configure {
                addr: ep.addr,
                last,
                descriptor: descriptor.to_vec(),
            });
            if state.fail_configure == Some(ep.addr) {
                return Err(UsbError::InvalidEndpoint);
            }
            state.enabled.push(ep.addr);
            Ok(())
        })
    }

    fn disable(&mut self, ep: &mut MockEndpoint) -> Option<MockRequest> {
        let req = self.take(ep.addr);
        self.with(|state| {
            state.events.push(Event::Disable(ep.addr));
            state.enabled.retain(|&addr| addr != ep.addr);
        });
        req.map(|req| req.fail(TransferError::Shutdown))
    }

    fn submit(
        &mut self,
        ep: &mut MockEndpoint,
        req: MockRequest,
    ) -> core::result::Result<(), Rejected<MockRequest>> {
        let addr = ep.addr;
        self.submit_to(addr, req)
    }

    fn submit_ep0(&mut self, req: MockRequest) -> core::result::Result<(), Rejected<MockRequest>> {
        self.submit_to(EP0, req)
    }

    fn cancel_ep0(&mut self) -> Option<MockRequest> {
        self.take(EP0).map(|req| req.fail(TransferError::Shutdown))
    }

    fn connect(&mut self) {
        self.with(|state| state.events.push(Event::Connect));
    }

    fn set_self_powered(&mut self) {
        self.with(|state| state.events.push(Event::SelfPowered));
    }
}

#[derive(Default)]
pub struct MockStack {
    pub registered: u32,
    pub unregistered: u32,
    pub register_error: Option<Error>,
    pub pkt: u32,
    pub ipv4: u32,
    pub ipv6: u32,
    pub arp: u32,
    pub polls: u32,
    pub carrier: u32,
    /// Response that `arp_input()` leaves in the device
    pub arp_reply: Option<Vec<u8>>,
    /// Frames that `poll()` offers, one per call to `txpoll`
    pub outbox: VecDeque<Vec<u8>>,
}

impl NetStack for MockStack {
    fn register(&mut self, dev: &mut NetDev, link: LinkType) -> Result<()> {
        assert_eq!(link, LinkType::Ethernet);
        assert!(!dev.flags.contains(crate::netdev::IfFlags::UP));
        match self.register_error {
            Some(err) => Err(err),
            None => {
                self.registered += 1;
                Ok(())
            }
        }
    }

    fn unregister(&mut self, _: &mut NetDev) {
        self.unregistered += 1;
    }

    fn ipv4_input(&mut self, dev: &mut NetDev) {
        self.ipv4 += 1;
        dev.set_len(0);
    }

    fn ipv6_input(&mut self, dev: &mut NetDev) {
        self.ipv6 += 1;
        dev.set_len(0);
    }

    fn arp_input(&mut self, dev: &mut NetDev) {
        self.arp += 1;
        match &self.arp_reply {
            Some(reply) => {
                dev.load(reply).unwrap();
            }
            None => dev.set_len(0),
        }
    }

    fn pkt_input(&mut self, _: &mut NetDev) {
        self.pkt += 1;
    }

    fn poll(&mut self, dev: &mut NetDev, txpoll: &mut dyn FnMut(&mut NetDev) -> bool) {
        self.polls += 1;
        while let Some(frame) = self.outbox.pop_front() {
            dev.load(&frame).unwrap();
            if txpoll(dev) {
                break;
            }
        }
    }

    fn carrier_on(&mut self, dev: &mut NetDev) {
        self.carrier += 1;
        dev.flags.insert(crate::netdev::IfFlags::RUNNING);
    }
}

/// The network lock, around a [`MockStack`]
#[derive(Clone, Default)]
pub struct MockNet {
    stack: Arc<Mutex<MockStack>>,
}

impl MockNet {
    pub fn with<R>(&self, f: impl FnOnce(&mut MockStack) -> R) -> R {
        f(&mut self.stack.lock().unwrap())
    }
}

impl Network for MockNet {
    type Stack = MockStack;

    fn lock<R>(&self, f: impl FnOnce(&mut MockStack) -> R) -> R {
        f(&mut self.stack.lock().unwrap())
    }
}

struct SemState {
    count: u32,
    interrupt_next: u32,
    interruptions: u32,
}

/// A condvar semaphore, with injectable interruptions
#[derive(Clone)]
pub struct MockSemaphore {
    inner: Arc<(Mutex<SemState>, Condvar)>,
}

impl MockSemaphore {
    pub fn new(count: u32) -> Self {
        MockSemaphore {
            inner: Arc::new((
                Mutex::new(SemState {
                    count,
                    interrupt_next: 0,
                    interruptions: 0,
                }),
                Condvar::new(),
            )),
        }
    }

    /// Interrupt the next `waits` waits
    pub fn interrupt_next(&self, waits: u32) {
        self.inner.0.lock().unwrap().interrupt_next = waits;
    }

    pub fn count(&self) -> u32 {
        self.inner.0.lock().unwrap().count
    }

    pub fn interruptions(&self) -> u32 {
        self.inner.0.lock().unwrap().interruptions
    }
}

impl Semaphore for MockSemaphore {
    fn wait(&self) -> core::result::Result<(), Interrupted> {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().unwrap();
        if state.interrupt_next > 0 {
            state.interrupt_next -= 1;
            state.interruptions += 1;
            return Err(Interrupted);
        }
        while state.count == 0 {
            state = cvar.wait(state).unwrap();
        }
        state.count -= 1;
        Ok(())
    }

    fn post(&self) {
        let (lock, cvar) = &*self.inner;
        lock.lock().unwrap().count += 1;
        cvar.notify_one();
    }

    fn reset(&self, count: u32) {
        let (lock, cvar) = &*self.inner;
        lock.lock().unwrap().count = count;
        cvar.notify_all();
    }
}

/// A FIFO work queue, drained by the test
#[derive(Clone, Default)]
pub struct MockKernel {
    queue: Arc<Mutex<VecDeque<Work>>>,
    delays: Arc<Mutex<Vec<u32>>>,
    semaphores: Arc<Mutex<Vec<MockSemaphore>>>,
}

impl MockKernel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Vec<Work> {
        self.queue.lock().unwrap().iter().copied().collect()
    }

    pub fn pop(&self) -> Option<Work> {
        self.queue.lock().unwrap().pop_front()
    }

    pub fn delays(&self) -> Vec<u32> {
        self.delays.lock().unwrap().clone()
    }

    /// The first semaphore the driver created
    pub fn tx_semaphore(&self) -> MockSemaphore {
        self.semaphores.lock().unwrap()[0].clone()
    }
}

impl Kernel for MockKernel {
    type Semaphore = MockSemaphore;

    fn semaphore(&self, initial: u32) -> MockSemaphore {
        let sem = MockSemaphore::new(initial);
        self.semaphores.lock().unwrap().push(sem.clone());
        sem
    }

    fn queue_work(&self, work: Work) {
        self.queue.lock().unwrap().push_back(work);
    }

    fn delay_ms(&self, ms: u32) {
        self.delays.lock().unwrap().push(ms);
    }
}

pub type Driver = CdcEcm<MockUsb, MockNet, MockKernel>;

/// A driver wired to mocks
pub struct Harness {
    pub driver: Arc<Driver>,
    pub usb: MockUsb,
    pub net: MockNet,
    pub kernel: MockKernel,
}

impl Harness {
    /// A constructed, but unbound, driver
    pub fn unbound(config: Config, speed: Speed) -> Self {
        let usb = MockUsb::new(speed);
        let net = MockNet::default();
        let kernel = MockKernel::new();
        let driver = CdcEcm::new(
            0,
            usb.clone(),
            net.clone(),
            kernel.clone(),
            config,
            DeviceInfo::new(),
        )
        .unwrap();
        Harness {
            driver: Arc::new(driver),
            usb,
            net,
            kernel,
        }
    }

    /// A bound driver, waiting for the host to configure it
    pub fn bound(config: Config, speed: Speed) -> Self {
        let harness = Self::unbound(config, speed);
        harness.driver.bind().unwrap();
        harness.usb.clear_events();
        harness
    }

    /// A bound and configured full-speed driver
    pub fn configured() -> Self {
        let harness = Self::bound(Config::new(), Speed::Full);
        harness.driver.set_config(1).unwrap();
        harness.usb.clear_events();
        harness
    }

    /// Run queued work until the queue is empty; returns the jobs run
    pub fn drain(&self) -> usize {
        let mut jobs = 0;
        while let Some(work) = self.kernel.pop() {
            self.driver.run(work);
            jobs += 1;
        }
        jobs
    }

    /// Complete the transfer queued on `addr` with `finish`
    pub fn complete(&self, addr: u8, finish: impl FnOnce(MockRequest) -> MockRequest) {
        let req = self.usb.take(addr).expect("no request queued");
        self.driver.complete(EndpointAddress::from(addr), finish(req));
    }
}

/// A standard or class control request
pub fn control(request_type: RequestType, request: u8, value: u16, index: u16, length: u16) -> Request {
    Request {
        direction: UsbDirection::In,
        request_type,
        recipient: Recipient::Device,
        request,
        value,
        index,
        length,
    }
}

/// An Ethernet frame of `len` bytes with the given Ethertype
pub fn frame(ethertype: u16, len: usize) -> Vec<u8> {
    let mut frame = std::vec![0u8; len];
    frame[..6].copy_from_slice(&[0xff; 6]);
    frame[6..12].copy_from_slice(&[0x02, 0x00, 0x00, 0x11, 0x22, 0x33]);
    frame[12..14].copy_from_slice(&ethertype.to_be_bytes());
    frame
}
