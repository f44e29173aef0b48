//! Message model: X-Road requests, responses and their error shapes.

use crate::constants::DEFAULT_PROTOCOL_VERSION;
use crate::error::{require_non_empty, XRoadError};
use crate::member::{ConsumerMember, ProducerMember, SecurityServer};
use serde::{Deserialize, Serialize};

/// Error carried by a message.
///
/// The variant decides the body shape: `NonTechnical` lives inside a normal
/// response element, `Standard` replaces the whole body with a SOAP `Fault`
/// and suppresses the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorMessage {
    NonTechnical {
        fault_code: Option<String>,
        fault_string: Option<String>,
    },
    Standard {
        fault_code: Option<String>,
        fault_string: Option<String>,
        fault_actor: Option<String>,
        detail: Option<String>,
    },
}

impl ErrorMessage {
    pub fn non_technical(fault_code: impl Into<String>, fault_string: impl Into<String>) -> Self {
        ErrorMessage::NonTechnical {
            fault_code: Some(fault_code.into()),
            fault_string: Some(fault_string.into()),
        }
    }

    pub fn standard(
        fault_code: impl Into<String>,
        fault_string: impl Into<String>,
        fault_actor: Option<String>,
        detail: Option<String>,
    ) -> Self {
        ErrorMessage::Standard {
            fault_code: Some(fault_code.into()),
            fault_string: Some(fault_string.into()),
            fault_actor,
            detail,
        }
    }

    pub fn is_standard(&self) -> bool {
        matches!(self, ErrorMessage::Standard { .. })
    }

    pub fn fault_code(&self) -> Option<&str> {
        match self {
            ErrorMessage::NonTechnical { fault_code, .. } | ErrorMessage::Standard { fault_code, .. } => {
                fault_code.as_deref()
            }
        }
    }

    pub fn fault_string(&self) -> Option<&str> {
        match self {
            ErrorMessage::NonTechnical { fault_string, .. }
            | ErrorMessage::Standard { fault_string, .. } => fault_string.as_deref(),
        }
    }

    pub fn fault_actor(&self) -> Option<&str> {
        match self {
            ErrorMessage::Standard { fault_actor, .. } => fault_actor.as_deref(),
            ErrorMessage::NonTechnical { .. } => None,
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            ErrorMessage::Standard { detail, .. } => detail.as_deref(),
            ErrorMessage::NonTechnical { .. } => None,
        }
    }
}

/// Wrapper and namespace placement rules for a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WrapperPolicy {
    /// Nest payloads under `request`/`response` elements
    pub process_wrappers: bool,
    /// Producer namespace on the request element
    pub add_ns_to_request: bool,
    /// Producer namespace on the response payload root
    pub add_ns_to_response: bool,
    /// Producer namespace on the `<serviceCode>Response` element
    pub add_ns_to_service_response: bool,
    /// Apply the namespace after the payload hook, covering its elements too
    pub force_ns_on_children: bool,
}

impl Default for WrapperPolicy {
    fn default() -> Self {
        Self {
            process_wrappers: true,
            add_ns_to_request: true,
            add_ns_to_response: true,
            add_ns_to_service_response: true,
            force_ns_on_children: false,
        }
    }
}

impl WrapperPolicy {
    /// No wrappers and no namespace injection anywhere.
    pub fn plain() -> Self {
        Self {
            process_wrappers: false,
            add_ns_to_request: false,
            add_ns_to_response: false,
            add_ns_to_service_response: false,
            force_ns_on_children: false,
        }
    }

    pub fn any_namespace_flag(&self) -> bool {
        self.add_ns_to_request || self.add_ns_to_response || self.add_ns_to_service_response
    }
}

/// Header fields shared by requests and responses.
#[derive(Debug, Clone, Serialize)]
pub struct MessageHeader {
    pub consumer: Option<ConsumerMember>,
    pub producer: Option<ProducerMember>,
    pub security_server: Option<SecurityServer>,
    pub id: Option<String>,
    pub user_id: Option<String>,
    pub issue: Option<String>,
    pub protocol_version: String,
    pub security_token: Option<String>,
    pub security_token_type: Option<String>,
    /// Parsed from responses only, never written.
    pub request_hash: Option<String>,
    pub request_hash_algorithm: Option<String>,
}

impl Default for MessageHeader {
    fn default() -> Self {
        Self {
            consumer: None,
            producer: None,
            security_server: None,
            id: None,
            user_id: None,
            issue: None,
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            security_token: None,
            security_token_type: None,
            request_hash: None,
            request_hash_algorithm: None,
        }
    }
}

impl MessageHeader {
    pub fn new(consumer: ConsumerMember, producer: ProducerMember, id: &str) -> Result<Self, XRoadError> {
        require_non_empty(id, "id")?;
        Ok(Self {
            consumer: Some(consumer),
            producer: Some(producer),
            id: Some(id.to_string()),
            ..Default::default()
        })
    }

    /// Header fields for the response to `request`.
    pub fn reply_to(request: &MessageHeader) -> Self {
        Self {
            consumer: request.consumer.clone(),
            producer: request.producer.clone(),
            security_server: request.security_server.clone(),
            id: request.id.clone(),
            user_id: request.user_id.clone(),
            issue: request.issue.clone(),
            protocol_version: request.protocol_version.clone(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_none() && self.producer.is_none() && self.id.is_none()
    }

    /// Consumer and producer, or `MissingMember`.
    pub fn require_members(&self) -> Result<(&ConsumerMember, &ProducerMember), XRoadError> {
        let consumer = self
            .consumer
            .as_ref()
            .ok_or_else(|| XRoadError::MissingMember("consumer".to_string()))?;
        let producer = self
            .producer
            .as_ref()
            .ok_or_else(|| XRoadError::MissingMember("producer".to_string()))?;
        Ok((consumer, producer))
    }

    pub fn service_code(&self) -> Option<&str> {
        self.producer.as_ref().map(|p| p.service_code.as_str())
    }

    pub fn with_security_server(mut self, server: SecurityServer) -> Self {
        self.security_server = Some(server);
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.issue = Some(issue.into());
        self
    }

    pub fn with_security_token(mut self, token: impl Into<String>, token_type: Option<String>) -> Self {
        self.security_token = Some(token.into());
        self.security_token_type = token_type;
        self
    }
}

/// Random message id (UUID v4).
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// An X-Road service request.
#[derive(Debug, Clone)]
pub struct ServiceRequest<T> {
    pub header: MessageHeader,
    pub request_data: Option<T>,
    /// Only `process_wrappers` and `add_ns_to_request` apply to requests.
    pub policy: WrapperPolicy,
    pub error_message: Option<ErrorMessage>,
}

impl<T> ServiceRequest<T> {
    pub fn new(consumer: ConsumerMember, producer: ProducerMember, id: &str) -> Result<Self, XRoadError> {
        Ok(Self::from_header(MessageHeader::new(consumer, producer, id)?))
    }

    pub fn from_header(header: MessageHeader) -> Self {
        Self {
            header,
            request_data: None,
            policy: WrapperPolicy::default(),
            error_message: None,
        }
    }

    pub fn with_data(mut self, data: T) -> Self {
        self.request_data = Some(data);
        self
    }

    pub fn consumer(&self) -> Option<&ConsumerMember> {
        self.header.consumer.as_ref()
    }

    pub fn producer(&self) -> Option<&ProducerMember> {
        self.header.producer.as_ref()
    }

    pub fn id(&self) -> Option<&str> {
        self.header.id.as_deref()
    }
}

impl<T> PartialEq for ServiceRequest<T> {
    fn eq(&self, other: &Self) -> bool {
        self.header.id == other.header.id
    }
}

/// An X-Road service response.
#[derive(Debug, Clone)]
pub struct ServiceResponse<Req, Resp> {
    pub header: MessageHeader,
    /// Echo of the request payload, present when wrappers are processed.
    pub request_data: Option<Req>,
    pub response_data: Option<Resp>,
    pub policy: WrapperPolicy,
    pub error_message: Option<ErrorMessage>,
}

impl<Req, Resp> ServiceResponse<Req, Resp> {
    pub fn new(consumer: ConsumerMember, producer: ProducerMember, id: &str) -> Result<Self, XRoadError> {
        Ok(Self::from_header(MessageHeader::new(consumer, producer, id)?))
    }

    pub fn from_header(header: MessageHeader) -> Self {
        Self {
            header,
            request_data: None,
            response_data: None,
            policy: WrapperPolicy::default(),
            error_message: None,
        }
    }

    /// Response to `request`: same parties and id, wrapper setting inherited.
    pub fn for_request<T>(request: &ServiceRequest<T>) -> Self {
        let mut response = Self::from_header(MessageHeader::reply_to(&request.header));
        response.policy.process_wrappers = request.policy.process_wrappers;
        response
    }

    pub fn with_response_data(mut self, data: Resp) -> Self {
        self.response_data = Some(data);
        self
    }

    pub fn consumer(&self) -> Option<&ConsumerMember> {
        self.header.consumer.as_ref()
    }

    pub fn producer(&self) -> Option<&ProducerMember> {
        self.header.producer.as_ref()
    }

    pub fn id(&self) -> Option<&str> {
        self.header.id.as_deref()
    }

    pub fn has_standard_fault(&self) -> bool {
        self.error_message.as_ref().is_some_and(ErrorMessage::is_standard)
    }
}

impl<Req, Resp> PartialEq for ServiceResponse<Req, Resp> {
    fn eq(&self, other: &Self) -> bool {
        self.header.id == other.header.id
    }
}
