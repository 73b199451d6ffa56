//! The receive path, and interrupt work

use core::sync::atomic::Ordering;

use crate::{
    netdev::{NetDev, NetStack, Network, ETHERTYPE_ARP, ETHERTYPE_IPV4, ETHERTYPE_IPV6},
    stats::Statistics,
    usbdev::{TransferError, UsbDevice, UsbRequest},
    work::{Kernel, Work},
};

use super::CdcEcm;

/// What the read request held
enum Received {
    Nothing,
    Frame,
    Oversized,
}

impl<U, N, K> CdcEcm<U, N, K>
where
    U: UsbDevice,
    N: Network,
    K: Kernel,
{
    /// A read on bulk OUT finished
    pub(super) fn read_complete(&self, req: U::Request) {
        trace!(
            "Read complete: len {}, transferred {}, result {:?}",
            req.len(),
            req.transferred(),
            req.result()
        );
        match req.result() {
            Ok(()) => {
                self.with_usb_mut(|usb| usb.rdreq.finish(req));
                let was_pending = self.rx_pending.swap(true, Ordering::AcqRel);
                debug_assert!(!was_pending, "read completed with a frame pending");
                self.irq_slot.try_enqueue(&self.kernel, Work::Interrupt);
            }
            Err(TransferError::Shutdown) => {
                self.with_usb_mut(|usb| usb.rdreq.finish(req));
            }
            Err(TransferError::Failed(err)) => {
                warn!("Read failed: {:?}", err);
                Statistics::bump(&self.stats.rx_errors);
                let resubmitted = self.with_usb_mut(|usb| {
                    usb.rdreq.finish(req);
                    usb.submit_read()
                });
                if let Err(err) = resubmitted {
                    error!("Read resubmit failed: {:?}", err);
                }
            }
        }
    }

    /// Handle a received frame, and a finished write
    pub(super) fn interrupt_work(&self) {
        self.irq_slot.begin();
        self.net.lock(|stack| {
            let mut dev = self.netdev.lock();

            if self.rx_pending.load(Ordering::Acquire) {
                self.receive(stack, &mut dev);

                let resubmitted = self.with_usb_mut(|usb| {
                    self.rx_pending.store(false, Ordering::Release);
                    if usb.is_configured() {
                        usb.submit_read()
                    } else {
                        Ok(())
                    }
                });
                if let Err(err) = resubmitted {
                    error!("Read resubmit failed: {:?}", err);
                }
            }

            if self.tx_done.swap(false, Ordering::AcqRel) {
                Statistics::bump(&self.stats.tx_done);
                self.poll_stack(stack, &mut dev);
            }
        });
    }

    /// Move the pending frame into `dev`, and hand it to the stack
    fn receive(&self, stack: &mut N::Stack, dev: &mut NetDev) {
        let received = self.with_usb_mut(|usb| match usb.rdreq.get() {
            None => Received::Nothing,
            Some(req) => match req.buf().get(..req.transferred()) {
                Some([]) => Received::Nothing,
                Some(frame) if dev.load(frame).is_some() => Received::Frame,
                _ => Received::Oversized,
            },
        });

        match received {
            Received::Nothing => {
                debug!("No frame in the read request");
                return;
            }
            Received::Oversized => {
                warn!("Dropping oversized frame");
                Statistics::bump(&self.stats.rx_packets);
                Statistics::bump(&self.stats.rx_dropped);
                dev.set_len(0);
                return;
            }
            Received::Frame => Statistics::bump(&self.stats.rx_packets),
        }

        stack.pkt_input(dev);

        match dev.ethertype() {
            Some(ETHERTYPE_IPV4) => {
                debug!("IPv4 frame");
                Statistics::bump(&self.stats.rx_ipv4);
                stack.ipv4_input(dev);
                self.reply(dev);
            }
            Some(ETHERTYPE_IPV6) => {
                debug!("IPv6 frame");
                Statistics::bump(&self.stats.rx_ipv6);
                stack.ipv6_input(dev);
                self.reply(dev);
            }
            Some(ETHERTYPE_ARP) => {
                debug!("ARP frame");
                stack.arp_input(dev);
                Statistics::bump(&self.stats.rx_arp);
                self.reply(dev);
            }
            _ => {
                Statistics::bump(&self.stats.rx_dropped);
            }
        }
    }

    /// Send what the stack left in `dev`, if anything
    fn reply(&self, dev: &NetDev) {
        if !dev.is_empty() {
            if let Err(err) = self.transmit(dev) {
                warn!("Reply dropped: {:?}", err);
            }
        }
    }
}
