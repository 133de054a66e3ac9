use crate::connectivity::upnp::fault;
use crate::connectivity::{
    ControlAction, ControlError, MappingError, TransportError, TransportProtocol,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[test]
fn test_control_action_names() {
    let add = ControlAction::AddPortMapping {
        protocol: TransportProtocol::TCP,
        external_port: 8080,
        internal_client: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50)), 8080),
        description: "test".to_string(),
        lease_duration: 0,
    };
    let delete = ControlAction::DeletePortMapping {
        protocol: TransportProtocol::UDP,
        external_port: 5000,
    };

    assert_eq!(ControlAction::GetExternalIpAddress.name(), "GetExternalIPAddress");
    assert_eq!(
        ControlAction::GetGenericPortMappingEntry { index: 3 }.name(),
        "GetGenericPortMappingEntry"
    );
    assert_eq!(add.name(), "AddPortMapping");
    assert_eq!(delete.name(), "DeletePortMapping");
}

#[test]
fn test_fault_codes() {
    assert_eq!(fault::ACTION_FAILED, 501);
    assert_eq!(fault::ACTION_NOT_AUTHORIZED, 606);
    assert_eq!(fault::SPECIFIED_ARRAY_INDEX_INVALID, 713);
    assert_eq!(fault::NO_SUCH_ENTRY_IN_ARRAY, 714);
    assert_eq!(fault::CONFLICT_IN_MAPPING_ENTRY, 718);
    assert_eq!(fault::ONLY_PERMANENT_LEASES_SUPPORTED, 725);
}

#[test]
fn test_fault_becomes_gateway_error() {
    let err: MappingError =
        ControlError::fault(fault::CONFLICT_IN_MAPPING_ENTRY, "ConflictInMappingEntry").into();

    match err {
        MappingError::GatewayError { code, message } => {
            assert_eq!(code, 718);
            assert_eq!(message, "ConflictInMappingEntry");
        }
        other => panic!("expected gateway error, got {:?}", other),
    }
}

#[test]
fn test_transport_failure_stays_transport_failure() {
    let err: MappingError = ControlError::from(TransportError::Timeout { attempts: 1 }).into();
    assert!(matches!(
        err,
        MappingError::Transport(TransportError::Timeout { attempts: 1 })
    ));
}

#[test]
fn test_control_error_display() {
    let err = ControlError::fault(fault::ACTION_NOT_AUTHORIZED, "ActionNotAuthorized");
    assert_eq!(err.to_string(), "UPnP error 606: ActionNotAuthorized");

    let err = ControlError::from(TransportError::Malformed("empty body".to_string()));
    assert_eq!(err.to_string(), "malformed response: empty body");
}
