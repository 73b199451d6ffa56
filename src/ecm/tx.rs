//! The transmit path, and poll work

use core::sync::atomic::Ordering;

use crate::{
    descriptor::EndpointRole,
    error::{Error, Result},
    netdev::{NetDev, NetStack, Network},
    stats::Statistics,
    usbdev::{Rejected, RequestFlags, UsbDevice, UsbRequest},
    work::{Kernel, Work},
};

use super::{CdcEcm, Usb};

impl<U: UsbDevice> Usb<U> {
    /// Copy `frame` into the idle write request, and queue it on bulk IN
    ///
    /// On failure, the write request is idle again.
    fn submit_write(&mut self, frame: &[u8]) -> Result<()> {
        if !self.is_configured() {
            return Err(Error::NotConfigured);
        }
        let ep = self.eps[EndpointRole::BulkIn as usize]
            .as_mut()
            .ok_or(Error::NotConfigured)?;
        let mut req = self.wrreq.begin().ok_or(Error::NoMemory)?;

        if frame.len() > req.buf().len() {
            self.wrreq.finish(req);
            return Err(Error::InvalidArgument);
        }
        req.buf_mut()[..frame.len()].copy_from_slice(frame);
        req.set_len(frame.len());
        req.set_flags(RequestFlags::NULL_PACKET);

        self.dev
            .submit(ep, req)
            .map_err(|Rejected { error, request }| {
                self.wrreq.finish(request);
                Error::Usb(error)
            })
    }
}

impl<U, N, K> CdcEcm<U, N, K>
where
    U: UsbDevice,
    N: Network,
    K: Kernel,
{
    /// Send the frame in `dev` to the host
    ///
    /// Blocks until the previous frame is out of the write request. The
    /// write completion releases the TX permit, so don't call this from
    /// the completion context.
    pub fn transmit(&self, dev: &NetDev) -> Result<()> {
        self.tx_permit.acquire();
        Statistics::bump(&self.stats.tx_packets);

        let result = self.with_usb_mut(|usb| usb.submit_write(dev.frame()));
        if let Err(err) = result {
            warn!("Transmit of {} bytes failed: {:?}", dev.len(), err);
            self.tx_permit.release();
        }
        result
    }

    /// A write on bulk IN finished
    pub(super) fn write_complete(&self, req: U::Request) {
        trace!(
            "Write complete: len {}, transferred {}, result {:?}",
            req.len(),
            req.transferred(),
            req.result()
        );
        self.with_usb_mut(|usb| usb.wrreq.finish(req));
        self.tx_permit.release();
        self.tx_done.store(true, Ordering::Release);
        self.irq_slot.try_enqueue(&self.kernel, Work::Interrupt);
    }

    /// Offer the stack a chance to send, once the interface is up
    pub(super) fn poll_work(&self) {
        self.poll_slot.begin();
        self.net.lock(|stack| {
            if self.is_up() {
                self.poll_stack(stack, &mut self.netdev.lock());
            }
        });
    }

    /// Let the stack send one frame
    pub(super) fn poll_stack(&self, stack: &mut N::Stack, dev: &mut NetDev) {
        stack.poll(dev, &mut |dev: &mut NetDev| {
            if let Err(err) = self.transmit(dev) {
                warn!("Poll transmit failed: {:?}", err);
            }
            // One write request, so one frame per poll
            true
        });
    }
}
