//! Port protocol inference.

use meshcfg_types::Protocol;

/// Ports whose protocol is known to be opaque TCP.
const WELL_KNOWN_TCP_PORTS: [u32; 4] = [
    25,    // SMTP
    53,    // DNS over TCP
    3306,  // MySQL
    27017, // MongoDB
];

/// Infer the application protocol of a service port.
///
/// In order: a declared `UDP` protocol wins; then a recognised
/// `appProtocol`; then the port-name prefix (case-insensitive, up to the first
/// `-`, with `grpc-web` matched whole); then the well-known port table, which
/// maps to TCP. Anything else is [`Protocol::Unsupported`].
///
/// # Example
///
/// ```rust
/// use meshcfg_registry::infer_protocol;
/// use meshcfg_types::Protocol;
///
/// assert_eq!(infer_protocol(None, None, "http-api", 8080), Protocol::Http);
/// assert_eq!(infer_protocol(None, None, "GRPC-Web-ui", 8080), Protocol::GrpcWeb);
/// assert_eq!(infer_protocol(None, None, "", 3306), Protocol::Tcp);
/// assert_eq!(infer_protocol(None, None, "metrics", 9090), Protocol::Unsupported);
/// ```
pub fn infer_protocol(
    declared: Option<&str>,
    app_protocol: Option<&str>,
    port_name: &str,
    port: u32,
) -> Protocol {
    if declared.is_some_and(|p| p.eq_ignore_ascii_case("udp")) {
        return Protocol::Udp;
    }

    if let Some(app) = app_protocol {
        let protocol = Protocol::parse(app);
        if !protocol.is_unsupported() {
            return protocol;
        }
    }

    let protocol = protocol_from_port_name(port_name);
    if !protocol.is_unsupported() {
        return protocol;
    }

    if WELL_KNOWN_TCP_PORTS.contains(&port) {
        return Protocol::Tcp;
    }
    Protocol::Unsupported
}

/// Protocol named by a port-name prefix such as `http-api` or `grpc-web-ui`.
pub fn protocol_from_port_name(name: &str) -> Protocol {
    let lower = name.to_ascii_lowercase();
    if lower == "grpc-web" || lower.starts_with("grpc-web-") {
        return Protocol::GrpcWeb;
    }
    let prefix = lower.split('-').next().unwrap_or_default();
    Protocol::parse(prefix)
}

/// Protocol of a declared `ServiceEntry` port, falling back to inference
/// when the declared name is not recognised.
pub fn service_entry_protocol(declared: &str, port_name: &str, port: u32) -> Protocol {
    let protocol = Protocol::parse(declared);
    if protocol.is_unsupported() {
        infer_protocol(None, None, port_name, port)
    } else {
        protocol
    }
}
