//! Network device callbacks

use core::sync::atomic::Ordering;

use crate::{
    error::{Error, Result},
    netdev::{NetDriver, Network},
    usbdev::UsbDevice,
    work::{Enqueue, Kernel, Work},
};

use super::CdcEcm;

impl<U, N, K> NetDriver for CdcEcm<U, N, K>
where
    U: UsbDevice,
    N: Network,
    K: Kernel,
{
    fn ifup(&self) -> Result<()> {
        info!("Bringing up: {:02x?}", self.config.mac_address);
        self.if_up.store(true, Ordering::Release);
        Ok(())
    }

    fn ifdown(&self) -> Result<()> {
        self.if_up.store(false, Ordering::Release);
        Ok(())
    }

    fn txavail(&self) -> Result<()> {
        if self.poll_slot.try_enqueue(&self.kernel, Work::Poll) == Enqueue::Dropped {
            trace!("Poll already pending");
        }
        Ok(())
    }

    fn addmac(&self, mac: &[u8; 6]) -> Result<()> {
        // No hardware filter; the host filters
        debug!("addmac {:02x?}", mac);
        Ok(())
    }

    fn rmmac(&self, mac: &[u8; 6]) -> Result<()> {
        debug!("rmmac {:02x?}", mac);
        Ok(())
    }

    fn ioctl(&self, cmd: u32, _arg: usize) -> Result<()> {
        error!("Unrecognized ioctl: {}", cmd);
        Err(Error::NotTty)
    }
}
