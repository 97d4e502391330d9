use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use layerfig::meta::Shape;
use layerfig::{BoxError, Layerfig, LayerfigError, Record, SetDefaults, Tag};
use serde::Deserialize;

#[derive(Record, Deserialize, Debug, Default)]
#[serde(default, rename_all = "kebab-case")]
struct Service {
    #[record(default = "10")]
    pub max_conns: u32,
    #[serde(rename = "svc")]
    #[record(env = "SERVICE_NAME")]
    pub service_name: String,
    #[record(skip)]
    pub handle: Option<u64>,
    internal: usize,
    pub upstreams: Vec<Upstream>,
    pub weights: HashMap<String, u8>,
    pub payload: Vec<u8>,
    pub r#type: String,
}

#[derive(Record, Deserialize, Debug, Default)]
#[serde(default)]
struct Upstream {
    #[record(default = "127.0.0.1")]
    pub addr: String,
}

fn keys<R: Record>() -> Vec<(&'static str, &'static str)> {
    R::descriptor()
        .fields
        .iter()
        .map(|f| (f.name, f.key))
        .collect()
}

#[test]
fn descriptor_lists_public_fields_with_document_keys() {
    assert_eq!(
        keys::<Service>(),
        vec![
            ("max_conns", "max-conns"),
            ("service_name", "svc"),
            ("upstreams", "upstreams"),
            ("weights", "weights"),
            ("payload", "payload"),
            ("type", "type"),
        ]
    );
    assert_eq!(Service::descriptor().type_name, "Service");
}

#[test]
fn descriptor_carries_tags() {
    let descriptor = Service::descriptor();
    let max_conns = descriptor.field("max_conns").unwrap();
    assert_eq!(max_conns.tags.default, Some("10"));
    assert_eq!(max_conns.tags.env, None);

    let name = descriptor.field("svc").unwrap();
    assert_eq!(name.name, "service_name");
    assert_eq!(name.tags.env, Some("SERVICE_NAME"));
}

#[test]
fn descriptor_shapes() {
    let shape = |name: &str| format!("{:?}", (Service::descriptor().field(name).unwrap().shape)());
    assert_eq!(shape("max_conns"), "Integer");
    assert_eq!(shape("service_name"), "Text");
    assert_eq!(shape("upstreams"), "Seq(Record(Upstream))");
    assert_eq!(shape("weights"), "Map(Integer)");
    assert_eq!(shape("payload"), "Bytes");
    assert!(matches!(
        (Upstream::descriptor().fields[0].shape)(),
        Shape::Text
    ));
}

#[test]
fn skipped_and_private_fields_are_left_alone() {
    let mut service = Service {
        handle: Some(7),
        internal: 3,
        upstreams: vec![Upstream::default(), Upstream { addr: "10.0.0.1".into() }],
        ..Service::default()
    };
    Layerfig::builder::<Service>()
        .env_vars([("SERVICE_NAME", "api")])
        .populate(&mut service)
        .unwrap();

    assert_eq!(service.handle, Some(7));
    assert_eq!(service.internal, 3);
    assert_eq!(service.max_conns, 10);
    assert_eq!(service.service_name, "api");
    assert_eq!(service.upstreams[0].addr, "127.0.0.1");
    assert_eq!(service.upstreams[1].addr, "10.0.0.1");
}

#[test]
fn renamed_keys_load_from_documents() {
    let service: Service = Layerfig::builder()
        .no_env()
        .document("svc.yaml", "max-conns: 3\nsvc: billing\ntype: grpc\n", layerfig::Format::Yaml)
        .load()
        .unwrap();
    assert_eq!(service.max_conns, 3);
    assert_eq!(service.service_name, "billing");
    assert_eq!(service.r#type, "grpc");
}

// --- set_defaults ---

#[derive(Record, Debug, Default)]
#[record(set_defaults)]
struct Listener {
    #[record(default = "0.0.0.0")]
    pub host: String,
    #[record(default = "8080")]
    pub port: u16,
    #[record(dsn = "${.host}:${.port}")]
    pub bind: String,
    pub admin_port: u16,
}

impl SetDefaults for Listener {
    fn set_defaults(&mut self) -> Result<(), BoxError> {
        if self.bind.is_empty() {
            return Err("bind must be derived before set_defaults".into());
        }
        if self.admin_port == 0 {
            self.admin_port = self.port + 1;
        }
        Ok(())
    }
}

#[test]
fn set_defaults_runs_after_every_field() {
    let mut listener = Listener::default();
    Layerfig::builder::<Listener>()
        .no_env()
        .populate(&mut listener)
        .unwrap();
    assert_eq!(listener.bind, "0.0.0.0:8080");
    assert_eq!(listener.admin_port, 8081);
}

#[derive(Record, Debug, Default)]
#[record(set_defaults)]
struct Picky {
    pub mode: String,
}

impl SetDefaults for Picky {
    fn set_defaults(&mut self) -> Result<(), BoxError> {
        Err(format!("unsupported mode '{}'", self.mode).into())
    }
}

#[derive(Record, Debug, Default)]
struct Outer {
    pub inner: Picky,
}

#[test]
fn set_defaults_error_names_the_struct_path() {
    let err = Layerfig::builder::<Outer>()
        .no_env()
        .populate(&mut Outer::default())
        .unwrap_err();
    match &err {
        LayerfigError::Load { origin, errors } => {
            assert_eq!(origin, "Outer");
            assert_eq!(errors[0].tag, Tag::SetDefaults);
            assert_eq!(errors[0].path, "inner");
        }
        other => panic!("Expected Load, got: {other:?}"),
    }
    assert!(err.to_string().contains("unsupported mode"));
}

// --- custom scanning ---

#[derive(Debug, Default, Clone, Copy, PartialEq)]
enum LogLevel {
    #[default]
    Unset,
    Debug,
    Info,
    Warn,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            other => Err(format!("unknown level '{other}'")),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Unset => "",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
        })
    }
}

layerfig::scan_from_str!(LogLevel);

#[derive(Record, Debug, Default)]
struct Logging {
    #[record(env = "LOG_LEVEL", default = "info")]
    pub level: LogLevel,
    pub per_module: Vec<LogLevel>,
    #[record(default = "1m30s")]
    pub flush: Duration,
    #[record(dsn = "level=${.level} flush=${.flush}")]
    pub summary: String,
}

#[test]
fn custom_types_take_part_in_resolution() {
    let mut logging = Logging::default();
    Layerfig::builder::<Logging>()
        .env_vars([("LOG_LEVEL", "WARN")])
        .populate(&mut logging)
        .unwrap();
    assert_eq!(logging.level, LogLevel::Warn);
    assert_eq!(logging.flush, Duration::from_secs(90));
    assert_eq!(logging.summary, "level=warn flush=1m30s");
}

#[test]
fn custom_type_default_applies_when_unset() {
    let mut logging = Logging::default();
    Layerfig::builder::<Logging>()
        .env_vars(std::iter::empty::<(String, String)>())
        .populate(&mut logging)
        .unwrap();
    assert_eq!(logging.level, LogLevel::Info);
}

#[test]
fn custom_type_parse_failure_is_a_field_error() {
    let err = Layerfig::builder::<Logging>()
        .env_vars([("LOG_LEVEL", "loud")])
        .populate(&mut Logging::default())
        .unwrap_err();
    let field = &err.field_errors()[0];
    assert_eq!(field.path, "level");
    assert_eq!(field.tag, Tag::Env);
    assert!(err.to_string().contains("unknown level 'loud'"));
}
