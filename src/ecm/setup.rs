//! EP0 control requests

use usb_device::control::{Request, RequestType};

use crate::{
    error::{Error, Result},
    netdev::{NetStack, Network},
    stats::Statistics,
    usbdev::{Rejected, RequestFlags, UsbDevice, UsbRequest},
    work::Kernel,
};

use super::CdcEcm;

/// The only ECM request that a device must support
const SET_ETHERNET_PACKET_FILTER: u8 = 0x43;

impl<U, N, K> CdcEcm<U, N, K>
where
    U: UsbDevice,
    N: Network,
    K: Kernel,
{
    /// Handle a control request, then queue the response on EP0
    pub(super) fn control(&self, req: &Request) -> Result<usize> {
        self.reclaim_ep0();
        let produced = self.dispatch(req)?;
        Ok(self.respond(req.length, produced))
    }

    /// Take back a control response that the host never collected
    ///
    /// A host that aborts a control transfer leaves the response queued
    /// on EP0.
    pub(super) fn reclaim_ep0(&self) {
        self.with_usb_mut(|usb| {
            if !usb.ctrlreq.is_in_flight() {
                return;
            }
            if let Some(req) = usb.dev.cancel_ep0() {
                warn!("Reclaimed an unfinished EP0 response of {} bytes", req.len());
                usb.ctrlreq.finish(req);
            }
        });
    }

    /// Returns the number of response bytes written to the control request
    fn dispatch(&self, req: &Request) -> Result<usize> {
        match req.request_type {
            RequestType::Standard => match req.request {
                Request::GET_DESCRIPTOR => self.get_descriptor(req.value),
                Request::SET_CONFIGURATION => self.set_config(req.value as u8).map(|()| 0),
                Request::SET_INTERFACE => {
                    self.set_interface(req.index, req.value);
                    Ok(0)
                }
                _ => {
                    warn!("Unsupported standard request: {:#04x}", req.request);
                    Err(Error::NotSupported)
                }
            },
            RequestType::Class => match req.request {
                SET_ETHERNET_PACKET_FILTER => {
                    // Always promiscuous; the host filters.
                    debug!(
                        "SET_ETHERNET_PACKET_FILTER value {:#06x} index {:#06x}",
                        req.value, req.index
                    );
                    Ok(0)
                }
                _ => {
                    warn!("Unsupported class request: {:#04x}", req.request);
                    Err(Error::NotSupported)
                }
            },
            _ => {
                warn!("Unsupported request type: {:?}", req.request_type);
                Err(Error::NotSupported)
            }
        }
    }

    fn get_descriptor(&self, value: u16) -> Result<usize> {
        let [index, desc_type] = value.to_le_bytes();
        let descriptors = self.descriptors();
        self.with_usb_mut(|usb| {
            usb.speed = usb.dev.speed();
            let speed = usb.speed;
            let req = usb.ctrlreq.get_mut().ok_or(Error::NoMemory)?;
            descriptors.get(desc_type, index, speed, Some(req.buf_mut()))
        })
    }

    fn set_interface(&self, interface: u16, alt: u16) {
        info!("SET_INTERFACE interface {} alt {}", interface, alt);
        self.net
            .lock(|stack| stack.carrier_on(&mut self.netdev.lock()));
    }

    /// Queue `min(length, produced)` bytes of the control request
    ///
    /// When the controller refuses the response, the request completes
    /// here as if it had succeeded. When the control request is still
    /// busy, the response is dropped. Either way the host sees success.
    fn respond(&self, length: u16, produced: usize) -> usize {
        let len = produced.min(usize::from(length));
        let submitted = self.with_usb_mut(|usb| {
            let mut req = usb.ctrlreq.begin()?;
            req.set_len(len);
            req.set_flags(RequestFlags::NULL_PACKET);
            Some(usb.dev.submit_ep0(req))
        });

        match submitted {
            Some(Ok(())) => {}
            Some(Err(Rejected { error, mut request })) => {
                warn!("EP0 submit failed: {:?}", error);
                Statistics::bump(&self.stats.ep0_submit_failures);
                request.set_result(Ok(()));
                self.ep0_complete(request);
            }
            None => {
                warn!("EP0 request busy, dropped a {} byte response", len);
                Statistics::bump(&self.stats.ep0_submit_failures);
            }
        }
        len
    }

    pub(super) fn ep0_complete(&self, req: U::Request) {
        if req.result().is_err() || req.transferred() != req.len() {
            error!(
                "EP0 result: {:?}, transferred {} of {}",
                req.result(),
                req.transferred(),
                req.len()
            );
        }
        self.with_usb_mut(|usb| usb.ctrlreq.finish(req));
    }
}
