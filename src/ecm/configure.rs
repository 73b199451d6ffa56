//! Endpoint and configuration management

use core::sync::atomic::Ordering;

use crate::{
    config::DeviceInfo,
    descriptor::{
        Descriptors, EndpointRole, CONFIG_ID, CONFIG_ID_NONE, MAX_ENDPOINT_DESC_LEN,
        NUM_ENDPOINTS,
    },
    error::{Error, Result},
    netdev::{IfFlags, NetDriver, Network},
    usbdev::{ClassDriver, Rejected, TransferError, UsbDevice, UsbRequest},
    work::Kernel,
};

use super::{CdcEcm, Configuration, Returned, Usb};

impl<U: UsbDevice> Usb<U> {
    /// Configure the endpoints for the current speed, in role order
    ///
    /// `enabled` counts the endpoints configured before any failure.
    fn enable_endpoints(&mut self, descriptors: &Descriptors<'_>, enabled: &mut usize) -> Result<()> {
        let speed = self.speed;
        for role in EndpointRole::ALL {
            let mut desc = [0; MAX_ENDPOINT_DESC_LEN];
            let len = descriptors.endpoint(role, speed, Some(&mut desc))?;
            let ep = self.eps[role as usize].as_mut().ok_or(Error::NoDevice)?;
            self.dev
                .configure(ep, &desc[..len], role == EndpointRole::BulkOut)?;
            *enabled += 1;
        }
        Ok(())
    }

    /// Disable the first `count` endpoints, in role order
    fn disable_endpoints(&mut self, count: usize, info: &DeviceInfo) -> Returned<U::Request> {
        let mut returned = [None, None, None];
        for (role, slot) in EndpointRole::ALL.into_iter().zip(returned.iter_mut()).take(count) {
            if let Some(ep) = self.eps[role as usize].as_mut() {
                *slot = self
                    .dev
                    .disable(ep)
                    .map(|req| (role.endpoint_address(info), req));
            }
        }
        returned
    }

    /// Queue the idle read request on bulk OUT
    pub(super) fn submit_read(&mut self) -> Result<()> {
        let ep = self.eps[EndpointRole::BulkOut as usize]
            .as_mut()
            .ok_or(Error::NotConfigured)?;
        let req = self.rdreq.begin().ok_or(Error::NoMemory)?;
        self.dev
            .submit(ep, req)
            .map_err(|Rejected { error, request }| {
                self.rdreq.finish(request);
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
    /// Select a configuration
    ///
    /// Selecting the current configuration does nothing. Zero resets the
    /// configuration. Any other value besides the one supported
    /// configuration is an [`Error::InvalidArgument`], and leaves the
    /// state as it was.
    ///
    /// Takes the network lock.
    pub fn set_config(&self, id: u8) -> Result<()> {
        if id == self.configuration() {
            return Ok(());
        }
        if id == CONFIG_ID_NONE {
            self.reset_config();
            return Ok(());
        }
        if id != CONFIG_ID {
            warn!("Invalid configuration: {}", id);
            return Err(Error::InvalidArgument);
        }

        self.net.lock(|_| {
            let descriptors = self.descriptors();
            // A frame that's still waiting for the work context owns the
            // read request. The work context queues it once configured.
            let rx_pending = self.rx_pending.load(Ordering::Acquire);
            let mut enabled = 0;
            let result: Result<()> = self.with_usb_mut(|usb| {
                usb.enable_endpoints(&descriptors, &mut enabled)?;
                if !rx_pending {
                    usb.submit_read()?;
                }
                Ok(())
            });

            if let Err(err) = result {
                error!("Configuration {} failed: {:?}", id, err);
                let returned = self.with_usb_mut(|usb| usb.disable_endpoints(enabled, &self.info));
                self.route_returned(returned);
                return Err(err);
            }

            {
                let mut dev = self.netdev.lock();
                dev.mac = self.config.mac_address;
                if self.ifup().is_ok() {
                    dev.flags.insert(IfFlags::UP);
                }
            }

            self.with_usb_mut(|usb| usb.configuration = Configuration::Configured(id));
            info!("Configured: {}", id);
            Ok(())
        })
    }

    /// Return to the unconfigured state, disabling all endpoints
    ///
    /// Does nothing when unconfigured. Takes the network lock.
    pub fn reset_config(&self) {
        self.net.lock(|_| {
            let previous = self.with_usb_mut(|usb| {
                core::mem::replace(&mut usb.configuration, Configuration::Unconfigured)
            });
            if previous == Configuration::Unconfigured {
                return;
            }
            info!("Reset configuration {}", previous.id());

            if let Err(err) = self.ifdown() {
                warn!("ifdown failed: {:?}", err);
            }
            self.netdev.lock().flags.remove(IfFlags::UP);

            let returned = self.with_usb_mut(|usb| {
                usb.disable_endpoints(usize::from(NUM_ENDPOINTS), &self.info)
            });
            self.route_returned(returned);
        })
    }

    /// Complete requests that disabled endpoints handed back
    fn route_returned(&self, returned: Returned<U::Request>) {
        for (ep, mut req) in returned.into_iter().flatten() {
            req.set_result(Err(TransferError::Shutdown));
            self.complete(ep, req);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        config::Config,
        error::Error,
        mock::{Event, Harness, BULK_IN, BULK_OUT, INT_IN},
        netdev::{IfFlags, NetDev, ETHERTYPE_IPV4},
        usbdev::Speed,
        ClassDriver,
    };

    #[test]
    fn configure_enables_endpoints_and_queues_read() {
        let h = Harness::bound(Config::new(), Speed::Full);
        h.driver.set_config(1).unwrap();

        let configures: std::vec::Vec<_> = h
            .usb
            .events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Configure { addr, last, descriptor } => Some((addr, last, descriptor)),
                _ => None,
            })
            .collect();
        assert_eq!(configures.len(), 3);
        assert_eq!(configures[0], (INT_IN, false, std::vec![7, 5, 0x81, 3, 16, 0, 5]));
        assert_eq!(configures[1], (BULK_IN, false, std::vec![7, 5, 0x82, 2, 64, 0, 0]));
        assert_eq!(configures[2], (BULK_OUT, true, std::vec![7, 5, 0x03, 2, 64, 0, 0]));

        assert!(h.usb.is_queued(BULK_OUT));
        assert_eq!(h.driver.configuration(), 1);
        assert!(h.driver.is_up());
        assert!(h.driver.netdev.lock().flags.contains(IfFlags::UP));
    }

    #[test]
    fn superspeed_endpoints_carry_companions() {
        let h = Harness::bound(Config::new().with_max_speed(Speed::Super), Speed::Super);
        h.driver.set_config(1).unwrap();
        let lens: std::vec::Vec<_> = h
            .usb
            .events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Configure { descriptor, .. } => Some(descriptor.len()),
                _ => None,
            })
            .collect();
        assert_eq!(lens, [13, 13, 13]);
    }

    #[test]
    fn same_configuration_is_a_noop() {
        let h = Harness::configured();
        h.driver.set_config(1).unwrap();
        assert!(h.usb.events().is_empty());
        assert_eq!(h.driver.configuration(), 1);
    }

    #[test]
    fn invalid_configuration_changes_nothing() {
        let h = Harness::bound(Config::new(), Speed::Full);
        assert_eq!(h.driver.set_config(0x42), Err(Error::InvalidArgument));
        assert_eq!(h.driver.configuration(), 0);
        assert!(!h.driver.is_up());
        assert!(h.usb.events().is_empty());

        let h = Harness::configured();
        assert_eq!(h.driver.set_config(2), Err(Error::InvalidArgument));
        assert_eq!(h.driver.configuration(), 1);
        assert!(h.driver.is_up());
        assert!(h.usb.events().is_empty());
    }

    #[test]
    fn reset_disables_all_endpoints_once() {
        let h = Harness::configured();
        h.driver.reset_config();
        assert_eq!(
            h.usb.events(),
            [
                Event::Disable(INT_IN),
                Event::Disable(BULK_IN),
                Event::Disable(BULK_OUT)
            ]
        );
        assert_eq!(h.driver.configuration(), 0);
        assert!(!h.driver.is_up());
        assert!(!h.driver.netdev.lock().flags.contains(IfFlags::UP));
        // The read request came back, and wasn't queued again
        assert!(!h.usb.is_queued(BULK_OUT));
        assert!(h.driver.with_usb_mut(|usb| usb.rdreq.get().is_some()));

        h.usb.clear_events();
        h.driver.reset_config();
        assert!(h.usb.events().is_empty());
    }

    #[test]
    fn zero_resets() {
        let h = Harness::configured();
        h.driver.set_config(0).unwrap();
        assert_eq!(h.driver.configuration(), 0);
        assert_eq!(h.usb.count(|event| matches!(event, Event::Disable(_))), 3);
    }

    #[test]
    fn reconfigure_after_reset() {
        let h = Harness::configured();
        h.driver.reset_config();
        h.usb.clear_events();
        h.driver.set_config(1).unwrap();
        assert_eq!(h.usb.submits(BULK_OUT), 1);
        assert_eq!(h.driver.configuration(), 1);
    }

    #[test]
    fn configure_failure_rolls_back() {
        let h = Harness::bound(Config::new(), Speed::Full);
        h.usb.with(|state| state.fail_configure = Some(BULK_OUT));
        assert!(matches!(h.driver.set_config(1), Err(Error::Usb(_))));
        assert_eq!(h.driver.configuration(), 0);
        assert!(!h.driver.is_up());
        assert_eq!(h.usb.count(|event| matches!(event, Event::Disable(_))), 2);
        assert!(h.usb.with(|state| state.enabled.is_empty()));
    }

    #[test]
    fn read_rejection_rolls_back() {
        let h = Harness::bound(Config::new(), Speed::Full);
        h.usb.with(|state| state.reject.push(BULK_OUT));
        assert!(matches!(h.driver.set_config(1), Err(Error::Usb(_))));
        assert_eq!(h.driver.configuration(), 0);
        assert_eq!(h.usb.count(|event| matches!(event, Event::Disable(_))), 3);
        assert!(h.driver.with_usb_mut(|usb| usb.rdreq.get().is_some()));
    }

    #[test]
    fn reset_returns_write_permit() {
        let h = Harness::configured();
        let mut dev = NetDev::new(0, [0; 6]);
        dev.load(&crate::mock::frame(ETHERTYPE_IPV4, 60)).unwrap();
        h.driver.transmit(&dev).unwrap();
        assert!(h.driver.tx_permit.is_held());

        h.driver.reset_config();
        assert!(!h.driver.tx_permit.is_held());
        assert_eq!(h.kernel.tx_semaphore().count(), 1);
        assert!(h.driver.with_usb_mut(|usb| usb.wrreq.get().is_some()));
    }

    #[test]
    fn disconnect_unconfigures() {
        let h = Harness::configured();
        h.driver.disconnect();
        assert_eq!(h.driver.configuration(), 0);
        assert!(!h.driver.is_up());
    }

    #[test]
    fn pending_frame_defers_read() {
        let h = Harness::configured();
        h.complete(BULK_OUT, |req| {
            req.receive(&crate::mock::frame(ETHERTYPE_IPV4, 60))
        });
        h.driver.reset_config();
        h.usb.clear_events();

        // The pending frame holds the read request across reconfiguration
        h.driver.set_config(1).unwrap();
        assert_eq!(h.usb.submits(BULK_OUT), 0);
        h.drain();
        assert_eq!(h.usb.submits(BULK_OUT), 1);
        assert!(!h.driver.rx_pending.load(core::sync::atomic::Ordering::Acquire));
    }
}
