//! Integration tests for the buzzer wire definitions
//!
//! Verifies the control request layout against the firmware contract and the
//! press event serialization used by the CLI's JSON output.

use protocol::{
    BUZZER_MAGIC_MARKER, BUZZER_PRODUCT_ID, BUZZER_VENDOR_ID, ControlRequest, DeviceKey,
    LogicalId, PressEvent, TransportError, is_press_marker,
};
use std::collections::HashSet;

mod wire_constants {
    use super::*;

    #[test]
    fn test_shared_vusb_ids() {
        assert_eq!(BUZZER_VENDOR_ID, 0x16c0);
        assert_eq!(BUZZER_PRODUCT_ID, 0x05dc);
    }

    #[test]
    fn test_only_marker_is_a_press() {
        let presses: Vec<u8> = (0..=u8::MAX).filter(|b| is_press_marker(*b)).collect();
        assert_eq!(presses, vec![BUZZER_MAGIC_MARKER]);
    }

    #[test]
    fn test_get_and_set_share_transfer_shape() {
        let get = ControlRequest::get_id();
        let set = ControlRequest::set_id(9);

        assert_eq!(get.request_type, set.request_type);
        assert_eq!(get.request, set.request);
        assert_eq!(get.index, set.index);
        assert_eq!(get.length, set.length);
        assert_ne!(get.value, set.value);
    }
}

mod device_keys {
    use super::*;

    #[test]
    fn test_keys_distinguish_bus_and_address() {
        let keys: HashSet<DeviceKey> = [
            DeviceKey::new(1, 2),
            DeviceKey::new(2, 1),
            DeviceKey::new(1, 2),
        ]
        .into_iter()
        .collect();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_display_parses_back() {
        let key = DeviceKey::new(3, 117);
        let parsed: DeviceKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_parse_error_mentions_input() {
        let err = "bogus".parse::<DeviceKey>().unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }
}

mod press_events {
    use super::*;

    #[test]
    fn test_press_event_json_shape() {
        let event = PressEvent::new(DeviceKey::new(1, 4), LogicalId(3));
        let json = serde_json::to_value(event).unwrap();

        assert_eq!(json["logical_id"], 3);
        assert_eq!(json["device"]["bus"], 1);
        assert_eq!(json["device"]["address"], 4);
    }

    #[test]
    fn test_transport_error_is_comparable() {
        assert_eq!(TransportError::Timeout, TransportError::Timeout);
        assert_ne!(TransportError::Timeout, TransportError::NoDevice);
    }
}
