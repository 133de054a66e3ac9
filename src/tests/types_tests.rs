use crate::connectivity::{
    Detail, Intent, MappingError, MappingProtocol, NotFound, OperationResult, PortMapping,
    TransportError, TransportProtocol, ValidationError,
};
use chrono::{TimeZone, Utc};
use clap::ValueEnum;
use std::net::{IpAddr, Ipv4Addr};

fn sample_mapping() -> PortMapping {
    PortMapping {
        protocol: TransportProtocol::TCP,
        external_port: 8080,
        internal_port: 8080,
        internal_ip: Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50))),
        description: Some("test".to_string()),
        lease_duration: Some(0),
    }
}

#[test]
fn test_protocol_display() {
    assert_eq!(MappingProtocol::UPnP.to_string(), "UPnP");
    assert_eq!(MappingProtocol::NATPMP.to_string(), "NAT-PMP");
    assert_eq!(TransportProtocol::TCP.to_string(), "TCP");
    assert_eq!(TransportProtocol::UDP.to_string(), "UDP");
}

#[test]
fn test_command_line_names() {
    assert_eq!(
        MappingProtocol::from_str("natpmp", false),
        Ok(MappingProtocol::NATPMP)
    );
    assert_eq!(
        TransportProtocol::from_str("udp", false),
        Ok(TransportProtocol::UDP)
    );
    assert_eq!(Intent::from_str("remove", false), Ok(Intent::Remove));
    assert!(Intent::from_str("delete", false).is_err());
}

#[test]
fn test_port_mapping_display() {
    assert_eq!(
        sample_mapping().to_string(),
        "TCP 8080 -> 192.168.1.50:8080 \"test\" (lease: permanent)"
    );

    let natpmp = PortMapping {
        protocol: TransportProtocol::UDP,
        external_port: 5000,
        internal_port: 5001,
        internal_ip: None,
        description: None,
        lease_duration: Some(3600),
    };
    assert_eq!(natpmp.to_string(), "UDP 5000 -> 5001 (lease: 3600s)");
}

#[test]
fn test_mapping_error_conversion() {
    let result: OperationResult = MappingError::NoGateway("none".to_string()).into();
    assert!(matches!(result, OperationResult::NotFound(NotFound::Gateway(_))));

    let result: OperationResult = MappingError::NoSuchMapping {
        protocol: TransportProtocol::UDP,
        external_port: 5000,
    }
    .into();
    assert!(matches!(result, OperationResult::NotFound(NotFound::Mapping { .. })));

    let result: OperationResult = MappingError::NotSupported("enumerate".to_string()).into();
    assert!(matches!(result, OperationResult::Unsupported(_)));

    let result: OperationResult = MappingError::Transport(TransportError::NoSession).into();
    assert!(matches!(
        result,
        OperationResult::TransportFailure(TransportError::NoSession)
    ));

    let result: OperationResult = MappingError::GatewayError {
        code: 606,
        message: "ActionNotAuthorized".to_string(),
    }
    .into();
    assert!(matches!(result, OperationResult::ProtocolError { code: 606, .. }));
}

#[test]
fn test_io_error_is_transport_failure() {
    let err: MappingError =
        std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
    assert!(matches!(err, MappingError::Transport(TransportError::Io(_))));
}

#[test]
fn test_exit_codes() {
    let success = OperationResult::Success(Detail::Removed {
        protocol: TransportProtocol::TCP,
        external_port: 8080,
    });
    let no_gateway = OperationResult::NotFound(NotFound::Gateway("none".to_string()));
    let no_mapping = OperationResult::NotFound(NotFound::Mapping {
        protocol: TransportProtocol::TCP,
        external_port: 8080,
    });
    let unsupported = OperationResult::Unsupported("internal ip".to_string());
    let transport = OperationResult::TransportFailure(TransportError::Timeout { attempts: 4 });
    let protocol = OperationResult::ProtocolError {
        code: 2,
        message: "Not authorized/refused".to_string(),
    };

    assert_eq!(success.exit_code(Intent::Remove), 0);
    assert_eq!(no_mapping.exit_code(Intent::Remove), 0);
    assert_eq!(no_gateway.exit_code(Intent::List), 0);
    assert_eq!(no_gateway.exit_code(Intent::Add), 2);
    assert_eq!(no_gateway.exit_code(Intent::Remove), 2);
    assert_eq!(unsupported.exit_code(Intent::Add), 1);
    assert_eq!(transport.exit_code(Intent::List), 2);
    assert_eq!(protocol.exit_code(Intent::Add), 2);

    assert_eq!(success.status(), "success");
    assert_eq!(no_gateway.status(), "not_found");
    assert_eq!(unsupported.status(), "unsupported");
    assert_eq!(transport.status(), "transport_failure");
    assert_eq!(protocol.status(), "protocol_error");
}

#[test]
fn test_operation_result_display() {
    let listing = OperationResult::Success(Detail::Listing {
        external_ip: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)),
        mappings: vec![sample_mapping()],
    });
    assert_eq!(
        listing.to_string(),
        "Discovered UPnP device. External IP: 203.0.113.7\n\
         Mapping 0: TCP 8080 -> 192.168.1.50:8080 \"test\" (lease: permanent)"
    );

    let removed = OperationResult::Success(Detail::Removed {
        protocol: TransportProtocol::UDP,
        external_port: 5000,
    });
    assert_eq!(removed.to_string(), "Port mapping removed: UDP 5000");

    let missing = OperationResult::NotFound(NotFound::Mapping {
        protocol: TransportProtocol::TCP,
        external_port: 8080,
    });
    assert_eq!(
        missing.to_string(),
        "No port mapping for TCP 8080; nothing to remove"
    );

    let protocol = OperationResult::ProtocolError {
        code: 718,
        message: "ConflictInMappingEntry".to_string(),
    };
    assert_eq!(protocol.to_string(), "Gateway error 718: ConflictInMappingEntry");
}

#[test]
fn test_detail_serialization() {
    let detail = Detail::Added {
        external_ip: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)),
        mapping: sample_mapping(),
        expires_at: Some(Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap()),
    };

    let json = serde_json::to_value(&detail).unwrap();
    assert_eq!(json["kind"], "added");
    assert_eq!(json["external_ip"], "203.0.113.7");
    assert_eq!(json["mapping"]["protocol"], "TCP");
    assert_eq!(json["mapping"]["internal_ip"], "192.168.1.50");
    assert_eq!(json["expires_at"], "2030-01-02T03:04:05Z");

    let detail = Detail::ExternalAddressOnly {
        external_ip: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)),
        notice: "no listing".to_string(),
    };
    let json = serde_json::to_value(&detail).unwrap();
    assert_eq!(json["kind"], "external_address_only");
}

#[test]
fn test_validation_error_messages() {
    let err = ValidationError::MissingParameter {
        method: MappingProtocol::NATPMP,
        intent: "remove",
        parameter: "--internal-port",
    };
    assert_eq!(err.to_string(), "Missing --internal-port for NAT-PMP remove");

    let err = ValidationError::PortOutOfRange {
        parameter: "--external-port",
        value: 70000,
    };
    assert_eq!(
        err.to_string(),
        "--external-port must be between 1 and 65535, got 70000"
    );
}
