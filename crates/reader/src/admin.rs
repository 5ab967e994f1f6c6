//! One-shot device administration
//!
//! Listing and id programming open each buzzer briefly without a reader
//! thread, so they must not run while a [`BuzzerReader`](crate::BuzzerReader)
//! holds the same devices.

use crate::error::{BuzzerError, Result};
use crate::usb::BuzzerSession;
use common::UsbBackend;
use protocol::{DeviceKey, LogicalId};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of probing one attached buzzer
#[derive(Debug, Clone, Serialize)]
pub struct ProbedDevice {
    pub key: DeviceKey,
    /// `None` if the device could not be opened or did not answer
    pub logical_id: Option<LogicalId>,
}

/// Enumerate attached buzzers and read each one's logical id
pub fn probe_devices<B: UsbBackend>(backend: &B, read_timeout: Duration) -> Result<Vec<ProbedDevice>> {
    let mut probed = Vec::new();

    for device in backend.enumerate()? {
        let key = backend.device_key(&device);
        let logical_id = match backend.open(&device) {
            Ok(transport) => {
                let mut session = BuzzerSession::new(key, transport, read_timeout);
                let id = session.logical_id();
                session.close();
                match id {
                    Ok(id) => Some(id),
                    Err(e) => {
                        warn!("{}", e);
                        None
                    }
                }
            }
            Err(source) => {
                warn!("{}", BuzzerError::OpenFailed { key, source });
                None
            }
        };
        probed.push(ProbedDevice { key, logical_id });
    }

    probed.sort_by_key(|p| p.key);
    Ok(probed)
}

/// Program the logical id of one buzzer
///
/// Without `target`, exactly one buzzer must be attached. Returns the key
/// of the programmed device and the id it confirmed.
pub fn program_logical_id<B: UsbBackend>(
    backend: &B,
    target: Option<DeviceKey>,
    id: LogicalId,
    read_timeout: Duration,
) -> Result<(DeviceKey, LogicalId)> {
    if id.0 == 0 {
        return Err(BuzzerError::InvalidLogicalId(id.0));
    }

    let mut devices = backend.enumerate()?;
    let device = match target {
        Some(key) => {
            let pos = devices
                .iter()
                .position(|d| backend.device_key(d) == key)
                .ok_or(BuzzerError::UnknownDevice(key))?;
            devices.swap_remove(pos)
        }
        None => match devices.len() {
            1 => devices.remove(0),
            0 => return Err(BuzzerError::Backend("No buzzer attached".to_string())),
            n => {
                return Err(BuzzerError::Backend(format!(
                    "{} buzzers attached, select one with --device",
                    n
                )));
            }
        },
    };

    let key = backend.device_key(&device);
    let transport = backend
        .open(&device)
        .map_err(|source| BuzzerError::OpenFailed { key, source })?;

    let mut session = BuzzerSession::new(key, transport, read_timeout);
    let confirmed = session.set_logical_id(id);
    session.close();

    let confirmed = confirmed?;
    debug!("Buzzer {} programmed to id {}", key, confirmed);
    Ok((key, confirmed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::MockBackend;

    const TIMEOUT: Duration = Duration::from_millis(20);

    #[test]
    fn test_probe_reads_ids_and_releases() {
        let backend = MockBackend::new();
        let a = backend.plug(DeviceKey::new(1, 4), 4);
        let b = backend.plug(DeviceKey::new(1, 2), 2);

        let probed = probe_devices(&backend, TIMEOUT).unwrap();
        assert_eq!(probed.len(), 2);
        assert_eq!(probed[0].key, DeviceKey::new(1, 2));
        assert_eq!(probed[0].logical_id, Some(LogicalId(2)));
        assert_eq!(probed[1].logical_id, Some(LogicalId(4)));
        assert_eq!(a.closes(), 1);
        assert_eq!(b.closes(), 1);
    }

    #[test]
    fn test_probe_reports_unreadable_device() {
        let backend = MockBackend::new();
        let key = DeviceKey::new(1, 1);
        backend.plug(key, 1);
        backend.fail_open(key);

        let probed = probe_devices(&backend, TIMEOUT).unwrap();
        assert_eq!(probed[0].logical_id, None);
    }

    #[test]
    fn test_program_single_device() {
        let backend = MockBackend::new();
        let key = DeviceKey::new(1, 1);
        let buzzer = backend.plug(key, 1);

        let (programmed, id) =
            program_logical_id(&backend, None, LogicalId(7), TIMEOUT).unwrap();
        assert_eq!(programmed, key);
        assert_eq!(id, LogicalId(7));
        assert_eq!(buzzer.logical_id(), 7);
        assert_eq!(buzzer.closes(), 1);
    }

    #[test]
    fn test_program_requires_selection_when_ambiguous() {
        let backend = MockBackend::new();
        backend.plug(DeviceKey::new(1, 1), 1);
        let second = backend.plug(DeviceKey::new(1, 2), 2);

        assert!(program_logical_id(&backend, None, LogicalId(5), TIMEOUT).is_err());

        let (_, id) =
            program_logical_id(&backend, Some(DeviceKey::new(1, 2)), LogicalId(5), TIMEOUT)
                .unwrap();
        assert_eq!(id, LogicalId(5));
        assert_eq!(second.logical_id(), 5);
    }

    #[test]
    fn test_program_rejects_unknown_and_zero() {
        let backend = MockBackend::new();
        backend.plug(DeviceKey::new(1, 1), 1);

        assert!(matches!(
            program_logical_id(&backend, Some(DeviceKey::new(2, 2)), LogicalId(3), TIMEOUT),
            Err(BuzzerError::UnknownDevice(_))
        ));
        assert!(matches!(
            program_logical_id(&backend, None, LogicalId(0), TIMEOUT),
            Err(BuzzerError::InvalidLogicalId(0))
        ));
    }
}
