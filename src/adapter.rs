//! Adapter pipeline.
//!
//! Takes the bytes of an inbound SOAP request, dispatches it to the service
//! registered for its service code and returns the outbound message. Every
//! failure on the way degrades to a standard SOAP fault; nothing escapes as an
//! error.

use crate::config::{AdapterConfig, ProducerConfig};
use crate::constants::FAULT_CODE_CLIENT;
use crate::envelope::{Attachment, SoapMessage};
use crate::error::XRoadError;
use crate::message::{ErrorMessage, ServiceRequest, ServiceResponse};
use crate::request::{CustomRequestDeserializer, ServiceRequestDeserializer};
use crate::response::ServiceResponseSerializer;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};

const INVALID_SOAP_MESSAGE: &str = "Invalid SOAP message.";
const UNABLE_TO_PARSE: &str = "Invalid X-Road SOAP message. Unable to parse the request.";
const UNKNOWN_SERVICE_CODE: &str = "Unknown service code.";
const INTERNAL_SERVER_ERROR: &str = "500 Internal Server Error";

/// Written when even the fault document can't be serialized.
const INTERNAL_SERVER_ERROR_XML: &str = concat!(
    r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">"#,
    "<SOAP-ENV:Body><SOAP-ENV:Fault><faultcode>SOAP-ENV:Client</faultcode>",
    "<faultstring>500 Internal Server Error</faultstring>",
    "</SOAP-ENV:Fault></SOAP-ENV:Body></SOAP-ENV:Envelope>"
);

/// Serialized reply handed back to the transport.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub body: String,
    pub content_type: String,
    pub attachments: Vec<Attachment>,
}

/// Business logic behind one service code.
pub trait ServiceHandler: Send + Sync {
    /// Produce the reply to `request`, read from `inbound`.
    ///
    /// `producer` holds the namespace the service element is expected in and
    /// the one stamped on the response. On failure a handler may leave a
    /// fault on `request.error_message`; the adapter returns it to the caller.
    fn handle(
        &self,
        request: &mut ServiceRequest<()>,
        inbound: &SoapMessage,
        producer: &ProducerConfig,
    ) -> Result<SoapMessage, XRoadError>;
}

/// Fills in the response for a typed request.
pub type ServiceLogic<Req, Resp> =
    Box<dyn Fn(&ServiceRequest<Req>, &mut ServiceResponse<Req, Resp>) -> Result<(), XRoadError> + Send + Sync>;

/// Binary parts to send along with a serialized response.
pub type AttachmentProvider<Req, Resp> = Box<dyn Fn(&ServiceResponse<Req, Resp>) -> Vec<Attachment> + Send + Sync>;

/// A service built from a body parser, business logic and a response serializer.
pub struct Service<Req, Resp> {
    deserializer: CustomRequestDeserializer<Req>,
    serializer: ServiceResponseSerializer<Req, Resp>,
    logic: ServiceLogic<Req, Resp>,
    attachments: Option<AttachmentProvider<Req, Resp>>,
}

impl<Req, Resp> Service<Req, Resp> {
    pub fn new<F>(
        deserializer: CustomRequestDeserializer<Req>,
        serializer: ServiceResponseSerializer<Req, Resp>,
        logic: F,
    ) -> Self
    where
        F: Fn(&ServiceRequest<Req>, &mut ServiceResponse<Req, Resp>) -> Result<(), XRoadError> + Send + Sync + 'static,
    {
        Self {
            deserializer,
            serializer,
            logic: Box::new(logic),
            attachments: None,
        }
    }

    pub fn with_attachments<F>(mut self, provider: F) -> Self
    where
        F: Fn(&ServiceResponse<Req, Resp>) -> Vec<Attachment> + Send + Sync + 'static,
    {
        self.attachments = Some(Box::new(provider));
        self
    }
}

impl<Req, Resp> ServiceHandler for Service<Req, Resp> {
    fn handle(
        &self,
        request: &mut ServiceRequest<()>,
        inbound: &SoapMessage,
        producer: &ProducerConfig,
    ) -> Result<SoapMessage, XRoadError> {
        let mut typed: ServiceRequest<Req> = ServiceRequest::from_header(request.header.clone());
        typed.policy = request.policy;
        if let Err(e) = self
            .deserializer
            .deserialize(&mut typed, inbound, producer.search_namespace())
        {
            request.error_message = typed.error_message.take();
            return Err(e);
        }
        if let Some(member) = typed.header.producer.as_mut() {
            producer.stamp(member);
        }

        let mut response = ServiceResponse::for_request(&typed);
        response.policy = typed.policy;
        (self.logic)(&typed, &mut response)?;

        let mut message = self.serializer.serialize_reply(&mut response, &typed, inbound);
        if let Some(provider) = &self.attachments {
            for attachment in provider(&response) {
                debug!(content_id = %attachment.content_id, "Adding attachment to response");
                message.add_attachment(attachment);
            }
        }
        Ok(message)
    }
}

/// Registry of services and the request pipeline in front of them.
pub struct Adapter {
    config: AdapterConfig,
    header_deserializer: ServiceRequestDeserializer,
    services: HashMap<String, Box<dyn ServiceHandler>>,
    /// Metrics tracking
    requests_processed: AtomicU64,
    faults_returned: AtomicU64,
}

impl Adapter {
    pub fn new(config: AdapterConfig) -> Self {
        let header_deserializer = ServiceRequestDeserializer::new(config.identifiers.mode);
        Self {
            config,
            header_deserializer,
            services: HashMap::new(),
            requests_processed: AtomicU64::new(0),
            faults_returned: AtomicU64::new(0),
        }
    }

    /// Register `handler` for `service_code`, replacing any earlier one.
    pub fn register(&mut self, service_code: impl Into<String>, handler: impl ServiceHandler + 'static) {
        let service_code = service_code.into();
        info!(service_code = %service_code, "Service registered");
        self.services.insert(service_code, Box::new(handler));
    }

    pub fn with_service(mut self, service_code: impl Into<String>, handler: impl ServiceHandler + 'static) -> Self {
        self.register(service_code, handler);
        self
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn requests_processed(&self) -> u64 {
        self.requests_processed.load(Ordering::Relaxed)
    }

    pub fn faults_returned(&self) -> u64 {
        self.faults_returned.load(Ordering::Relaxed)
    }

    /// Process a request without attachments.
    pub fn process(&self, body: &[u8], content_type: Option<&str>) -> Outbound {
        self.process_with_attachments(body, content_type, Vec::new())
    }

    /// Process a request whose MIME parts the transport has already split off.
    pub fn process_with_attachments(
        &self,
        body: &[u8],
        content_type: Option<&str>,
        attachments: Vec<Attachment>,
    ) -> Outbound {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
        debug!(content_length = body.len(), content_type = ?content_type, "New request received");

        let message = match self.read_message(body, content_type, attachments) {
            Ok(inbound) => self.process_message(&inbound),
            Err(reason) => self.fault(ErrorMessage::standard(
                FAULT_CODE_CLIENT,
                reason,
                Some(String::new()),
                Some(String::new()),
            )),
        };
        self.write(&message)
    }

    fn read_message(
        &self,
        body: &[u8],
        content_type: Option<&str>,
        attachments: Vec<Attachment>,
    ) -> Result<SoapMessage, String> {
        let settings = &self.config.settings;
        if !content_type.is_some_and(|ct| settings.accepts(ct)) {
            let content_type = content_type.unwrap_or("null");
            warn!(content_type, "Invalid content type");
            return Err(format!("Invalid content type : \"{}\".", content_type));
        }
        if body.len() > settings.max_message_size {
            warn!(
                size = body.len(),
                limit = settings.max_message_size,
                "Request exceeds maximum message size"
            );
            return Err(INVALID_SOAP_MESSAGE.to_string());
        }

        let mut message = SoapMessage::from_bytes(body).map_err(|e| {
            warn!(error = %e, "Unable to deserialize the request to SOAP");
            INVALID_SOAP_MESSAGE.to_string()
        })?;
        for attachment in attachments {
            message.add_attachment(attachment);
        }
        Ok(message)
    }

    fn process_message(&self, inbound: &SoapMessage) -> SoapMessage {
        let mut request: ServiceRequest<()> = match self.header_deserializer.deserialize(inbound) {
            Ok(request) => request,
            Err(e) => {
                error!(error = %e, "Deserializing SOAP message header to ServiceRequest failed");
                return self.fault(ErrorMessage::standard(
                    FAULT_CODE_CLIENT,
                    UNABLE_TO_PARSE,
                    Some(String::new()),
                    Some(String::new()),
                ));
            }
        };
        request.policy = self.config.wrappers;

        let handler = request
            .header
            .service_code()
            .and_then(|code| self.services.get(code));
        let Some(handler) = handler else {
            warn!(service_code = ?request.header.service_code(), "ServiceRequest was not processed. Unknown service code");
            return self.fault(ErrorMessage::standard(FAULT_CODE_CLIENT, UNKNOWN_SERVICE_CODE, None, None));
        };

        match handler.handle(&mut request, inbound, &self.config.producer) {
            Ok(message) => {
                debug!(message_id = ?request.id(), "ServiceRequest was processed");
                message
            }
            Err(e) => {
                error!(error = %e, message_id = ?request.id(), "ServiceRequest processing failed");
                let fault = request.error_message.take().unwrap_or_else(|| {
                    ErrorMessage::standard(FAULT_CODE_CLIENT, INTERNAL_SERVER_ERROR, None, None)
                });
                self.fault(fault)
            }
        }
    }

    fn fault(&self, error: ErrorMessage) -> SoapMessage {
        self.faults_returned.fetch_add(1, Ordering::Relaxed);
        ServiceResponseSerializer::<(), ()>::empty().fault_message(&error)
    }

    fn write(&self, message: &SoapMessage) -> Outbound {
        match message.to_xml_string() {
            Ok(body) => {
                let content_type = message.content_type();
                debug!(content_type = %content_type, "Send response");
                Outbound {
                    body,
                    content_type,
                    attachments: message.attachments().to_vec(),
                }
            }
            Err(e) => {
                error!(error = %e, "Internal server error. Message processing failed");
                self.faults_returned.fetch_add(1, Ordering::Relaxed);
                Outbound {
                    body: INTERNAL_SERVER_ERROR_XML.to_string(),
                    content_type: SoapMessage::without_header().content_type(),
                    attachments: Vec::new(),
                }
            }
        }
    }
}
