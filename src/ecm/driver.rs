//! Driver lifecycle, and the class driver role

use core::{cell::RefCell, sync::atomic::{AtomicBool, Ordering}};

use usb_device::{control::Request, endpoint::EndpointAddress};

use crate::{
    config::{Config, DeviceInfo},
    descriptor::{EndpointRole, MAX_DESC_LEN},
    error::{Error, Result},
    netdev::{LinkType, NetDev, NetDriver, NetStack, Network, ETH_FRAME_LEN, GUARD_SIZE},
    permit::TxPermit,
    slot::Slot,
    stats::Statistics,
    usbdev::{ep0_in, ClassDriver, UsbDevice, UsbRequest},
    work::{Kernel, WorkSlot},
};

use super::{CdcEcm, Usb};

/// Size of the read and write request buffers
const FRAME_REQUEST_LEN: usize = ETH_FRAME_LEN + GUARD_SIZE;

impl<U: UsbDevice> Usb<U> {
    /// Claim the control request, the endpoints, and the frame requests
    ///
    /// On failure, whatever was claimed stays claimed. Release it with
    /// [`release()`](Self::release).
    fn allocate(&mut self, info: &DeviceInfo) -> Result<()> {
        debug_assert!(!self.ctrlreq.is_allocated(), "bound twice");

        let ctrlreq = self
            .dev
            .alloc_request(ep0_in(), MAX_DESC_LEN)
            .ok_or(Error::NoMemory)?;
        self.ctrlreq = Slot::Idle(ctrlreq);

        for role in EndpointRole::ALL {
            self.eps[role as usize] = self
                .dev
                .alloc_ep(role.endpoint_address(info), role.kind());
        }
        if self.eps.iter().any(Option::is_none) {
            error!("Failed to allocate endpoints");
            return Err(Error::NoDevice);
        }

        let mut rdreq = self
            .dev
            .alloc_request(EndpointRole::BulkOut.endpoint_address(info), FRAME_REQUEST_LEN)
            .ok_or(Error::NoMemory)?;
        rdreq.set_len(FRAME_REQUEST_LEN);
        self.rdreq = Slot::Idle(rdreq);

        let wrreq = self
            .dev
            .alloc_request(EndpointRole::BulkIn.endpoint_address(info), FRAME_REQUEST_LEN)
            .ok_or(Error::NoMemory)?;
        self.wrreq = Slot::Idle(wrreq);

        Ok(())
    }

    /// Return endpoints and requests to the controller
    ///
    /// Requests that are still in flight stay with the controller.
    fn release(&mut self, info: &DeviceInfo) {
        self.free_ep(EndpointRole::InterruptIn);
        free_request(&mut self.dev, &mut self.ctrlreq, ep0_in());
        free_request(
            &mut self.dev,
            &mut self.rdreq,
            EndpointRole::BulkOut.endpoint_address(info),
        );
        self.free_ep(EndpointRole::BulkOut);
        free_request(
            &mut self.dev,
            &mut self.wrreq,
            EndpointRole::BulkIn.endpoint_address(info),
        );
        self.free_ep(EndpointRole::BulkIn);
    }

    fn free_ep(&mut self, role: EndpointRole) {
        if let Some(ep) = self.eps[role as usize].take() {
            self.dev.free_ep(ep);
        }
    }
}

fn free_request<U: UsbDevice>(dev: &mut U, slot: &mut Slot<U::Request>, addr: EndpointAddress) {
    if slot.is_in_flight() {
        warn!("Request on {:?} still in flight", addr);
    }
    if let Some(req) = slot.free() {
        dev.free_request(addr, req);
    }
}

impl<U, N, K> CdcEcm<U, N, K>
where
    U: UsbDevice,
    N: Network,
    K: Kernel,
{
    /// Create a driver, and register its interface with the network stack
    ///
    /// `minor` numbers the interface. The driver doesn't touch `usb` until
    /// the controller binds it. Fails with [`Error::InvalidArgument`] if
    /// `info` numbers interfaces, strings, or endpoints out of range.
    pub fn new(
        minor: u8,
        usb: U,
        net: N,
        kernel: K,
        config: Config,
        info: DeviceInfo,
    ) -> Result<Self> {
        if !info.is_valid() {
            error!("Invalid device numbering: {:?}", info);
            return Err(Error::InvalidArgument);
        }

        let tx_permit = TxPermit::new(kernel.semaphore(1));
        let driver = CdcEcm {
            usb: critical_section::Mutex::new(RefCell::new(Usb::new(usb, config.max_speed))),
            netdev: spin::Mutex::new(NetDev::new(minor, config.mac_address)),
            config,
            info,
            net,
            kernel,
            tx_permit,
            rx_pending: AtomicBool::new(false),
            tx_done: AtomicBool::new(false),
            if_up: AtomicBool::new(false),
            irq_slot: WorkSlot::new(),
            poll_slot: WorkSlot::new(),
            stats: Statistics::new(),
        };

        driver.ifdown()?;
        driver
            .net
            .lock(|stack| stack.register(&mut driver.netdev.lock(), LinkType::Ethernet))
            .map_err(|err| {
                error!("Interface registration failed: {:?}", err);
                err
            })?;

        info!("CDC-ECM interface {} registered", minor);
        Ok(driver)
    }

    /// Unregister the interface, and give back the controller
    pub fn uninitialize(self) -> U {
        self.net
            .lock(|stack| stack.unregister(&mut self.netdev.lock()));
        self.usb.into_inner().into_inner().dev
    }
}

impl<U, N, K> ClassDriver for CdcEcm<U, N, K>
where
    U: UsbDevice,
    N: Network,
    K: Kernel,
{
    type Request = U::Request;

    fn bind(&self) -> Result<()> {
        debug!("bind");
        if let Err(err) = self.with_usb_mut(|usb| usb.allocate(&self.info)) {
            error!("bind failed: {:?}", err);
            self.unbind();
            return Err(err);
        }

        self.tx_permit.reset();
        self.tx_done.store(false, Ordering::Release);
        self.net.lock(|_| self.netdev.lock().set_len(0));

        if !self.config.is_composite() {
            self.with_usb_mut(|usb| {
                if self.config.self_powered {
                    usb.dev.set_self_powered();
                }
                usb.dev.connect();
            });
        }
        Ok(())
    }

    fn unbind(&self) {
        debug!("unbind");
        // Disabling the endpoints hands back any queued requests
        self.reset_config();
        self.reclaim_ep0();
        self.kernel.delay_ms(self.config.settle_ms);

        self.with_usb_mut(|usb| usb.release(&self.info));
        self.net.lock(|_| {
            self.netdev.lock().set_len(0);
            // A pending frame went with the read request
            self.rx_pending.store(false, Ordering::Release);
        });
    }

    fn setup(&self, req: &Request, _dataout: &[u8]) -> Result<usize> {
        self.control(req)
    }

    fn disconnect(&self) {
        info!("disconnect");
        self.reset_config();
        self.reclaim_ep0();
    }

    fn complete(&self, ep: EndpointAddress, req: U::Request) {
        if ep == ep0_in() {
            self.ep0_complete(req);
        } else if ep == EndpointRole::BulkOut.endpoint_address(&self.info) {
            self.read_complete(req);
        } else if ep == EndpointRole::BulkIn.endpoint_address(&self.info) {
            self.write_complete(req);
        } else {
            warn!("Completion on unexpected endpoint {:?}", ep);
            self.with_usb_mut(|usb| usb.dev.free_request(ep, req));
        }
    }
}
