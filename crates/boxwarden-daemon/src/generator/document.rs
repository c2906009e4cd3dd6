//! sing-box configuration document.
//!
//! Only the subset of the sing-box schema boxwarden emits is modelled.
//! Field order is fixed by the struct definitions, so serialising the same
//! inputs always yields the same bytes.

use serde::Serialize;

/// Log level written into the generated config.
pub const LOG_LEVEL: &str = "warn";

/// Address every inbound listens on (all interfaces, dual-stack).
pub const LISTEN_ADDR: &str = "::";

const TUIC_PASSWORD: &str = "admin";
const TUIC_CONGESTION_CONTROL: &str = "bbr";
const VLESS_FLOW: &str = "xtls-rprx-vision";
const REALITY_HANDSHAKE_PORT: u16 = 443;
const QUIC_ALPN: &str = "h3";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub log: Log,
    pub inbounds: Vec<Inbound>,
    pub outbounds: Vec<Outbound>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Log {
    pub level: String,
}

/// One listening endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Inbound {
    Tuic {
        tag: String,
        listen: String,
        listen_port: u16,
        users: Vec<TuicUser>,
        congestion_control: String,
        tls: QuicTls,
    },
    Hysteria2 {
        tag: String,
        listen: String,
        listen_port: u16,
        users: Vec<PasswordUser>,
        tls: QuicTls,
    },
    Vless {
        tag: String,
        listen: String,
        listen_port: u16,
        users: Vec<VlessUser>,
        tls: RealityTls,
    },
}

impl Inbound {
    /// sing-box inbound type name.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Tuic { .. } => "tuic",
            Self::Hysteria2 { .. } => "hysteria2",
            Self::Vless { .. } => "vless",
        }
    }

    pub const fn listen_port(&self) -> u16 {
        match self {
            Self::Tuic { listen_port, .. }
            | Self::Hysteria2 { listen_port, .. }
            | Self::Vless { listen_port, .. } => *listen_port,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TuicUser {
    pub uuid: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordUser {
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VlessUser {
    pub uuid: String,
    pub flow: String,
}

/// TLS block of the QUIC inbounds, backed by the self-signed certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuicTls {
    pub enabled: bool,
    pub alpn: Vec<String>,
    pub certificate_path: String,
    pub key_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RealityTls {
    pub enabled: bool,
    pub server_name: String,
    pub reality: Reality,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reality {
    pub enabled: bool,
    pub handshake: Handshake,
    pub private_key: String,
    pub short_id: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Handshake {
    pub server: String,
    pub server_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outbound {
    #[serde(rename = "type")]
    pub kind: String,
    pub tag: String,
}

impl Outbound {
    pub fn direct() -> Self {
        Self {
            kind: "direct".into(),
            tag: "direct".into(),
        }
    }
}

impl Document {
    /// Wrap `inbounds` with the fixed log level and direct outbound.
    pub fn new(inbounds: Vec<Inbound>) -> Self {
        Self {
            log: Log {
                level: LOG_LEVEL.into(),
            },
            inbounds,
            outbounds: vec![Outbound::direct()],
        }
    }
}

/// Certificate/key paths as referenced from the generated config.
#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub certificate_path: String,
    pub key_path: String,
}

impl TlsPaths {
    fn quic_tls(&self) -> QuicTls {
        QuicTls {
            enabled: true,
            alpn: vec![QUIC_ALPN.into()],
            certificate_path: self.certificate_path.clone(),
            key_path: self.key_path.clone(),
        }
    }
}

pub fn tuic(port: u16, uuid: &str, tls: &TlsPaths) -> Inbound {
    Inbound::Tuic {
        tag: "tuic-in".into(),
        listen: LISTEN_ADDR.into(),
        listen_port: port,
        users: vec![TuicUser {
            uuid: uuid.into(),
            password: TUIC_PASSWORD.into(),
        }],
        congestion_control: TUIC_CONGESTION_CONTROL.into(),
        tls: tls.quic_tls(),
    }
}

/// Hysteria2 authenticates by password only; the operator uuid is reused.
pub fn hysteria2(port: u16, uuid: &str, tls: &TlsPaths) -> Inbound {
    Inbound::Hysteria2 {
        tag: "hy2-in".into(),
        listen: LISTEN_ADDR.into(),
        listen_port: port,
        users: vec![PasswordUser {
            password: uuid.into(),
        }],
        tls: tls.quic_tls(),
    }
}

pub fn vless_reality(
    port: u16,
    uuid: &str,
    sni: &str,
    private_key: &str,
    short_id: &str,
) -> Inbound {
    Inbound::Vless {
        tag: "reality-in".into(),
        listen: LISTEN_ADDR.into(),
        listen_port: port,
        users: vec![VlessUser {
            uuid: uuid.into(),
            flow: VLESS_FLOW.into(),
        }],
        tls: RealityTls {
            enabled: true,
            server_name: sni.into(),
            reality: Reality {
                enabled: true,
                handshake: Handshake {
                    server: sni.into(),
                    server_port: REALITY_HANDSHAKE_PORT,
                },
                private_key: private_key.into(),
                short_id: vec![short_id.into()],
            },
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn tls() -> TlsPaths {
        TlsPaths {
            certificate_path: ".singbox/cert.pem".into(),
            key_path: ".singbox/private.key".into(),
        }
    }

    #[test]
    fn empty_document_shape() {
        let value = serde_json::to_value(Document::new(Vec::new())).unwrap();
        assert_eq!(
            value,
            json!({
                "log": {"level": "warn"},
                "inbounds": [],
                "outbounds": [{"type": "direct", "tag": "direct"}]
            })
        );
    }

    #[test]
    fn tuic_inbound_shape() {
        let value = serde_json::to_value(tuic(443, "u1", &tls())).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "tuic",
                "tag": "tuic-in",
                "listen": "::",
                "listen_port": 443,
                "users": [{"uuid": "u1", "password": "admin"}],
                "congestion_control": "bbr",
                "tls": {
                    "enabled": true,
                    "alpn": ["h3"],
                    "certificate_path": ".singbox/cert.pem",
                    "key_path": ".singbox/private.key"
                }
            })
        );
    }

    #[test]
    fn hysteria2_uses_uuid_as_password() {
        let value = serde_json::to_value(hysteria2(8443, "u1", &tls())).unwrap();
        assert_eq!(value["type"], "hysteria2");
        assert_eq!(value["tag"], "hy2-in");
        assert_eq!(value["users"], json!([{"password": "u1"}]));
        assert!(value.get("congestion_control").is_none());
    }

    #[test]
    fn reality_inbound_shape() {
        let value: Value =
            serde_json::to_value(vless_reality(2053, "u1", "example.com", "PRIV", "01234567"))
                .unwrap();
        assert_eq!(value["type"], "vless");
        assert_eq!(value["users"], json!([{"uuid": "u1", "flow": "xtls-rprx-vision"}]));
        assert_eq!(
            value["tls"],
            json!({
                "enabled": true,
                "server_name": "example.com",
                "reality": {
                    "enabled": true,
                    "handshake": {"server": "example.com", "server_port": 443},
                    "private_key": "PRIV",
                    "short_id": ["01234567"]
                }
            })
        );
    }

    #[test]
    fn type_is_first_key() {
        let text = serde_json::to_string(&tuic(1, "u", &tls())).unwrap();
        assert!(text.starts_with(r#"{"type":"tuic""#));
    }
}
