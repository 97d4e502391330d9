#[cfg(test)]
pub mod test {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;
    use std::time::Duration;

    use serde::Deserialize;

    use crate::Record;

    // -- Document-loaded fixtures ------------------------------------------------

    #[derive(Record, Deserialize, Debug, Default, PartialEq)]
    #[serde(default)]
    pub struct AppConfig {
        /// The application host.
        #[record(default = "localhost")]
        pub host: String,

        #[record(env = "PORT", default = "8080")]
        pub port: u16,

        pub debug: bool,

        pub database: DbConfig,

        #[serde(with = "crate::serde_duration")]
        #[record(default = "30s")]
        pub timeout: Duration,

        #[record(default = "1MiB")]
        pub max_body: u64,

        pub tags: Vec<String>,
    }

    #[derive(Record, Deserialize, Debug, Default, PartialEq)]
    #[serde(default)]
    pub struct DbConfig {
        pub url: Option<String>,

        #[record(default = "5")]
        pub pool_size: usize,

        #[record(env = "DB_USER")]
        pub user: String,

        pub pass: String,

        #[record(dsn = "postgres://${.user}:${.pass}@db/app")]
        pub dsn: String,
    }

    /// Document keys differ from field names.
    #[derive(Record, Deserialize, Debug, Default, PartialEq)]
    #[serde(default, rename_all = "camelCase")]
    pub struct Renamed {
        #[record(default = "10")]
        pub max_conns: u32,

        #[serde(rename = "svc")]
        pub service_name: String,

        pub read_timeout: Option<String>,
    }

    // -- Engine fixtures ---------------------------------------------------------

    #[derive(Record, Debug, Default)]
    pub struct Database {
        #[record(env = "DB_HOST", default = "localhost")]
        pub host: String,
        #[record(default = "5432")]
        pub port: u16,
        #[record(env = "DB_USER")]
        pub user: String,
        pub pass: String,
        #[record(dsn = "postgres://${.user}:${.pass}@${.host}:5432/db")]
        pub dsn: String,
    }

    #[derive(Record, Debug, Default)]
    pub struct Listener {
        #[record(env = "LISTEN_PORT", default = "80")]
        pub port: u8,
    }

    #[derive(Record, Debug, Default)]
    pub struct Secrets {
        pub password_uri: String,
        #[record(ref_from = "password_uri", ref = "mem://fixed")]
        pub password: String,
        #[record(ref_from = "token_uri", ref = "mem://fixed")]
        pub token: String,
        #[record(default = "mem://token")]
        pub token_uri: String,
    }

    #[derive(Record, Debug, Default)]
    pub struct Credentials {
        pub tenant: String,
        #[record(ref = "mem://${.tenant}/key")]
        pub key: String,
    }

    #[derive(Record, Debug, Default)]
    pub struct Quota {
        #[record(env = "QUOTA_PORT", default = "8080")]
        pub port: u16,
        #[record(ref = "mem://limit", default = "7")]
        pub limit: u32,
    }

    #[derive(Record, Debug, Default)]
    pub struct SizedLimits {
        #[record(env = "MAX_BODY", default = "1MiB")]
        pub max_body: u64,
        #[record(default = "1KiB")]
        pub max_header: u32,
    }

    /// The template names fields declared after it.
    #[derive(Record, Debug, Default)]
    pub struct Derived {
        #[record(dsn = "https://${.host}:${.port}")]
        pub url: String,
        #[record(default = "example.com")]
        pub host: String,
        #[record(default = "8443")]
        pub port: u16,
    }

    #[derive(Record, Debug, Default)]
    pub struct Labels {
        pub name: Option<String>,
        #[record(dsn = "${.name}-x")]
        pub loose: String,
        #[record(dsn = "${.name}-x", dsn_strict)]
        pub strict: String,
    }

    #[derive(Record, Debug, Default)]
    pub struct BadDsn {
        #[record(dsn = "1")]
        pub count: u32,
    }

    #[derive(Record, Debug, Default)]
    pub struct Server {
        #[record(default = "localhost")]
        pub host: String,
        #[record(default = "80")]
        pub port: u16,
    }

    #[derive(Record, Debug, Default)]
    pub struct Services {
        pub list: Vec<Server>,
        pub by_name: HashMap<String, Server>,
    }

    #[derive(Record, Debug, Default)]
    pub struct Graph {
        pub head: Option<Rc<RefCell<Node>>>,
    }

    #[derive(Record, Debug, Default)]
    pub struct Node {
        #[record(default = "node")]
        pub name: String,
        pub next: Option<Rc<RefCell<Node>>>,
    }
}
