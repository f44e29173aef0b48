//! Identifier model: the parties named in an X-Road header.
//!
//! Identity is the canonical dotted form
//! (`instance.class.code[.subsystem][.service[.version]]`); equality and
//! hashing go through [`std::fmt::Display`].

use crate::error::{require_non_empty, XRoadError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Classification carried in the `objectType` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObjectType {
    Member,
    Subsystem,
    Service,
    #[serde(rename = "CENTRALSERVICE")]
    CentralService,
    Server,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Member => "MEMBER",
            ObjectType::Subsystem => "SUBSYSTEM",
            ObjectType::Service => "SERVICE",
            ObjectType::CentralService => "CENTRALSERVICE",
            ObjectType::Server => "SERVER",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = XRoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "MEMBER" => Ok(ObjectType::Member),
            "SUBSYSTEM" => Ok(ObjectType::Subsystem),
            "SERVICE" => Ok(ObjectType::Service),
            "CENTRALSERVICE" => Ok(ObjectType::CentralService),
            "SERVER" => Ok(ObjectType::Server),
            other => Err(XRoadError::Protocol(format!("Unknown objectType \"{}\"", other))),
        }
    }
}

/// The calling party.
#[derive(Debug, Clone, Serialize)]
pub struct ConsumerMember {
    pub instance: String,
    pub member_class: String,
    pub member_code: String,
    pub subsystem_code: Option<String>,
    pub object_type: ObjectType,
}

impl ConsumerMember {
    /// A member-level consumer (`MEMBER`).
    pub fn new(instance: &str, member_class: &str, member_code: &str) -> Result<Self, XRoadError> {
        require_non_empty(instance, "xRoadInstance")?;
        require_non_empty(member_class, "memberClass")?;
        require_non_empty(member_code, "memberCode")?;
        Ok(Self {
            instance: instance.to_string(),
            member_class: member_class.to_string(),
            member_code: member_code.to_string(),
            subsystem_code: None,
            object_type: ObjectType::Member,
        })
    }

    /// A subsystem consumer (`SUBSYSTEM`).
    pub fn with_subsystem(
        instance: &str,
        member_class: &str,
        member_code: &str,
        subsystem_code: &str,
    ) -> Result<Self, XRoadError> {
        require_non_empty(subsystem_code, "subsystemCode")?;
        let mut consumer = Self::new(instance, member_class, member_code)?;
        consumer.subsystem_code = Some(subsystem_code.to_string());
        consumer.object_type = ObjectType::Subsystem;
        Ok(consumer)
    }

    /// Build without validation; used when reconstructing from a header.
    pub(crate) fn unchecked(
        instance: String,
        member_class: String,
        member_code: String,
        subsystem_code: Option<String>,
    ) -> Self {
        let object_type = if subsystem_code.is_some() {
            ObjectType::Subsystem
        } else {
            ObjectType::Member
        };
        Self {
            instance,
            member_class,
            member_code,
            subsystem_code,
            object_type,
        }
    }
}

impl fmt::Display for ConsumerMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.instance, self.member_class, self.member_code)?;
        if let Some(subsystem) = &self.subsystem_code {
            write!(f, ".{}", subsystem)?;
        }
        Ok(())
    }
}

/// The called party and the service it offers.
#[derive(Debug, Clone, Serialize)]
pub struct ProducerMember {
    pub instance: String,
    /// `None` for central services
    pub member_class: Option<String>,
    pub member_code: Option<String>,
    pub subsystem_code: Option<String>,
    pub service_code: String,
    pub service_version: Option<String>,
    /// Set by the body codecs, not by callers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_prefix: Option<String>,
    pub object_type: ObjectType,
}

impl ProducerMember {
    /// A service offered by a member (`SERVICE`).
    pub fn new(
        instance: &str,
        member_class: &str,
        member_code: &str,
        service_code: &str,
    ) -> Result<Self, XRoadError> {
        require_non_empty(instance, "xRoadInstance")?;
        require_non_empty(member_class, "memberClass")?;
        require_non_empty(member_code, "memberCode")?;
        require_non_empty(service_code, "serviceCode")?;
        Ok(Self {
            instance: instance.to_string(),
            member_class: Some(member_class.to_string()),
            member_code: Some(member_code.to_string()),
            subsystem_code: None,
            service_code: service_code.to_string(),
            service_version: None,
            namespace_url: None,
            namespace_prefix: None,
            object_type: ObjectType::Service,
        })
    }

    /// A service offered by a member's subsystem.
    pub fn with_subsystem(
        instance: &str,
        member_class: &str,
        member_code: &str,
        subsystem_code: &str,
        service_code: &str,
    ) -> Result<Self, XRoadError> {
        require_non_empty(subsystem_code, "subsystemCode")?;
        let mut producer = Self::new(instance, member_class, member_code, service_code)?;
        producer.subsystem_code = Some(subsystem_code.to_string());
        Ok(producer)
    }

    /// A central service (`CENTRALSERVICE`), identified by instance and code only.
    pub fn central_service(instance: &str, service_code: &str) -> Result<Self, XRoadError> {
        require_non_empty(instance, "xRoadInstance")?;
        require_non_empty(service_code, "serviceCode")?;
        Ok(Self {
            instance: instance.to_string(),
            member_class: None,
            member_code: None,
            subsystem_code: None,
            service_code: service_code.to_string(),
            service_version: None,
            namespace_url: None,
            namespace_prefix: None,
            object_type: ObjectType::CentralService,
        })
    }

    pub fn with_version(mut self, version: &str) -> Result<Self, XRoadError> {
        require_non_empty(version, "serviceVersion")?;
        self.service_version = Some(version.to_string());
        Ok(self)
    }

    pub fn with_namespace(mut self, url: &str, prefix: &str) -> Self {
        self.set_namespace(Some(url), Some(prefix));
        self
    }

    /// Record the namespace the body element was found in.
    pub fn set_namespace(&mut self, url: Option<&str>, prefix: Option<&str>) {
        self.namespace_url = url.map(String::from);
        self.namespace_prefix = prefix.map(String::from);
    }

    /// Namespace URL, if one is set and non-empty.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace_url.as_deref().filter(|url| !url.is_empty())
    }

    pub fn is_central_service(&self) -> bool {
        self.object_type == ObjectType::CentralService
    }

    pub(crate) fn unchecked_service(
        instance: String,
        member_class: String,
        member_code: String,
        subsystem_code: Option<String>,
        service_code: String,
        service_version: Option<String>,
    ) -> Self {
        Self {
            instance,
            member_class: Some(member_class),
            member_code: Some(member_code),
            subsystem_code,
            service_code,
            service_version,
            namespace_url: None,
            namespace_prefix: None,
            object_type: ObjectType::Service,
        }
    }

    pub(crate) fn unchecked_central(instance: String, service_code: String) -> Self {
        Self {
            instance,
            member_class: None,
            member_code: None,
            subsystem_code: None,
            service_code,
            service_version: None,
            namespace_url: None,
            namespace_prefix: None,
            object_type: ObjectType::CentralService,
        }
    }
}

impl fmt::Display for ProducerMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.", self.instance)?;
        for part in [&self.member_class, &self.member_code, &self.subsystem_code]
            .into_iter()
            .flatten()
        {
            write!(f, "{}.", part)?;
        }
        f.write_str(&self.service_code)?;
        if let Some(version) = &self.service_version {
            write!(f, ".{}", version)?;
        }
        Ok(())
    }
}

/// The security server hosting the producer.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityServer {
    pub instance: String,
    pub member_class: String,
    pub member_code: String,
    pub server_code: String,
}

impl SecurityServer {
    pub fn new(
        instance: &str,
        member_class: &str,
        member_code: &str,
        server_code: &str,
    ) -> Result<Self, XRoadError> {
        require_non_empty(instance, "xRoadInstance")?;
        require_non_empty(member_class, "memberClass")?;
        require_non_empty(member_code, "memberCode")?;
        require_non_empty(server_code, "serverCode")?;
        Ok(Self::unchecked(
            instance.to_string(),
            member_class.to_string(),
            member_code.to_string(),
            server_code.to_string(),
        ))
    }

    pub(crate) fn unchecked(
        instance: String,
        member_class: String,
        member_code: String,
        server_code: String,
    ) -> Self {
        Self {
            instance,
            member_class,
            member_code,
            server_code,
        }
    }

    pub fn object_type(&self) -> ObjectType {
        ObjectType::Server
    }
}

impl fmt::Display for SecurityServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.instance, self.member_class, self.member_code, self.server_code
        )
    }
}

macro_rules! identity_by_display {
    ($($ty:ty),*) => {
        $(
            impl PartialEq for $ty {
                fn eq(&self, other: &Self) -> bool {
                    self.to_string() == other.to_string()
                }
            }

            impl Eq for $ty {}

            impl Hash for $ty {
                fn hash<H: Hasher>(&self, state: &mut H) {
                    self.to_string().hash(state);
                }
            }
        )*
    };
}

identity_by_display!(ConsumerMember, ProducerMember, SecurityServer);
