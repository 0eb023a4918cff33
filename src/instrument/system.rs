//! Source and target system descriptors

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Kind of system an ETL process reads from or writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemType {
    Database,
    File,
    Api,
    Http,
    Ftp,
    Sftp,
    S3,
    Kafka,
    Queue,
    Cache,
    Email,
}

impl SystemType {
    pub const ALL: [SystemType; 11] = [
        SystemType::Database,
        SystemType::File,
        SystemType::Api,
        SystemType::Http,
        SystemType::Ftp,
        SystemType::Sftp,
        SystemType::S3,
        SystemType::Kafka,
        SystemType::Queue,
        SystemType::Cache,
        SystemType::Email,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SystemType::Database => "database",
            SystemType::File => "file",
            SystemType::Api => "api",
            SystemType::Http => "http",
            SystemType::Ftp => "ftp",
            SystemType::Sftp => "sftp",
            SystemType::S3 => "s3",
            SystemType::Kafka => "kafka",
            SystemType::Queue => "queue",
            SystemType::Cache => "cache",
            SystemType::Email => "email",
        }
    }
}

impl fmt::Display for SystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(SystemType::as_str).collect();
                format!("unknown system type '{}', expected one of: {}", s, known.join(", "))
            })
    }
}

/// Description of one source or target system
///
/// Recorded on the task span as `etl.source_*` / `etl.target_*` attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub system_type: SystemType,
    /// Product or flavour, e.g. `postgresql`, `csv`, `rest_api`
    pub system_name: String,
    pub endpoint: Option<String>,
    pub object_name: Option<String>,
    pub count: Option<i64>,
}

impl SystemInfo {
    pub fn new(system_type: SystemType, system_name: impl Into<String>) -> Self {
        Self {
            system_type,
            system_name: system_name.into(),
            endpoint: None,
            object_name: None,
            count: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_object_name(mut self, object_name: impl Into<String>) -> Self {
        self.object_name = Some(object_name.into());
        self
    }

    pub fn with_count(mut self, count: i64) -> Self {
        self.count = Some(count);
        self
    }

    /// A database table, e.g. `database("postgresql", "db:5432", Some("orders"), Some(10))`
    pub fn database(
        database_type: impl Into<String>,
        host_and_port: impl Into<String>,
        table_name: Option<&str>,
        record_count: Option<i64>,
    ) -> Self {
        Self {
            system_type: SystemType::Database,
            system_name: database_type.into(),
            endpoint: Some(host_and_port.into()),
            object_name: table_name.map(str::to_string),
            count: record_count,
        }
    }

    /// A file; the endpoint is its directory and the object its file name
    pub fn file(path: impl AsRef<Path>, file_format: impl Into<String>, row_count: Option<i64>) -> Self {
        let path = path.as_ref();
        Self {
            system_type: SystemType::File,
            system_name: file_format.into(),
            endpoint: path.parent().map(|p| p.display().to_string()),
            object_name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
            count: row_count,
        }
    }

    /// A REST endpoint under `base_url`
    pub fn api(
        base_url: impl Into<String>,
        endpoint_path: Option<&str>,
        response_count: Option<i64>,
    ) -> Self {
        Self {
            system_type: SystemType::Http,
            system_name: "rest_api".to_string(),
            endpoint: Some(base_url.into()),
            object_name: endpoint_path.map(str::to_string),
            count: response_count,
        }
    }

    pub fn s3(bucket: &str, object_key: impl Into<String>, file_count: Option<i64>) -> Self {
        Self {
            system_type: SystemType::S3,
            system_name: "aws_s3".to_string(),
            endpoint: Some(format!("s3://{}", bucket)),
            object_name: Some(object_key.into()),
            count: file_count,
        }
    }

    pub fn kafka(
        broker_hosts: impl Into<String>,
        topic: impl Into<String>,
        message_count: Option<i64>,
    ) -> Self {
        Self {
            system_type: SystemType::Kafka,
            system_name: "apache_kafka".to_string(),
            endpoint: Some(broker_hosts.into()),
            object_name: Some(topic.into()),
            count: message_count,
        }
    }
}
