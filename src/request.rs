//! Request body codec.
//!
//! [`ServiceRequestSerializer`] turns a [`ServiceRequest`] into a SOAP
//! message, [`ServiceRequestDeserializer`] reads the header of an inbound
//! request and [`CustomRequestDeserializer`] hands the request payload to a
//! per-service parser.

use crate::constants::{ANY_NAMESPACE, ELEM_REQUEST, FAULT_CODE_CLIENT};
use crate::envelope::SoapMessage;
use crate::error::XRoadError;
use crate::header::{deserialize_header, serialize_header, IdentifierMode};
use crate::message::{ErrorMessage, ServiceRequest};
use crate::xml::Element;
use tracing::{debug, trace, warn};

/// Writes a request payload into its root element.
pub type RequestWriter<T> =
    Box<dyn Fn(&ServiceRequest<T>, &mut Element) -> Result<(), XRoadError> + Send + Sync>;

/// Parses a request payload node; `None` when the payload is absent.
pub type RequestParser<T> =
    Box<dyn Fn(Option<&Element>) -> Result<Option<T>, XRoadError> + Send + Sync>;

/// Serializes outbound requests.
pub struct ServiceRequestSerializer<T> {
    writer: RequestWriter<T>,
}

impl<T> ServiceRequestSerializer<T> {
    pub fn new<F>(writer: F) -> Self
    where
        F: Fn(&ServiceRequest<T>, &mut Element) -> Result<(), XRoadError> + Send + Sync + 'static,
    {
        Self {
            writer: Box::new(writer),
        }
    }

    /// A serializer that writes no payload, for meta services.
    pub fn empty() -> Self {
        Self::new(|_, _| Ok(()))
    }

    /// Build the SOAP message for `request`.
    ///
    /// Only identifier and id problems surface as errors; they mean the
    /// request was constructed wrongly.
    pub fn serialize(&self, request: &ServiceRequest<T>) -> Result<SoapMessage, XRoadError> {
        debug!(message_id = ?request.id(), "Serialize ServiceRequest message to SOAP");
        let mut message = SoapMessage::new();
        serialize_header(&request.header, request.error_message.as_ref(), &mut message)?;
        self.serialize_body(request, &mut message)?;
        debug!("ServiceRequest message was serialized");
        Ok(message)
    }

    fn serialize_body(&self, request: &ServiceRequest<T>, message: &mut SoapMessage) -> Result<(), XRoadError> {
        let (_, producer) = request.header.require_members()?;
        let namespace = producer.namespace();
        debug!(namespace = ?namespace, "Generate SOAP body");

        let mut service = match namespace {
            Some(url) => Element::qualified(
                producer.service_code.as_str(),
                producer.namespace_prefix.as_deref(),
                url,
            ),
            None => Element::new(producer.service_code.as_str()),
        };

        if request.request_data.is_some() {
            let policy = request.policy;
            let add_namespace = |root: &mut Element| {
                if let (Some(url), true) = (namespace, policy.add_ns_to_request) {
                    root.apply_namespace(producer.namespace_prefix.as_deref(), url);
                }
            };
            if policy.process_wrappers {
                debug!("Adding \"request\" wrapper to request message");
                let root = service.add_child(Element::new(ELEM_REQUEST));
                (self.writer)(request, root)?;
                add_namespace(root);
            } else {
                debug!("Skipping \"request\" wrapper in request message");
                (self.writer)(request, &mut service)?;
                add_namespace(&mut service);
            }
        }

        message.body_mut().add_child(service);
        Ok(())
    }
}

/// Reads the header of an inbound request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceRequestDeserializer {
    mode: IdentifierMode,
}

impl ServiceRequestDeserializer {
    pub fn new(mode: IdentifierMode) -> Self {
        Self { mode }
    }

    /// Deserialize the header of `message` into a request with no payload.
    ///
    /// An empty header gives an empty request. A header without `client` or
    /// `service` fails with `MissingMember`.
    pub fn deserialize<T>(&self, message: &SoapMessage) -> Result<ServiceRequest<T>, XRoadError> {
        let header = deserialize_header(message.header(), self.mode)?;
        if header.is_empty() {
            warn!("No SOAP header or an empty SOAP header was found");
            return Ok(ServiceRequest::from_header(header));
        }
        header.require_members()?;
        debug!(message_id = ?header.id, "SOAP message header was deserialized");
        Ok(ServiceRequest::from_header(header))
    }
}

/// Extracts the request payload with a per-service parser.
pub struct CustomRequestDeserializer<T> {
    parser: RequestParser<T>,
}

impl<T> CustomRequestDeserializer<T> {
    pub fn new<F>(parser: F) -> Self
    where
        F: Fn(Option<&Element>) -> Result<Option<T>, XRoadError> + Send + Sync + 'static,
    {
        Self {
            parser: Box::new(parser),
        }
    }

    /// Locate the service element in `namespace` (`*` for any) and parse its payload.
    ///
    /// When the element is missing, a `SOAP-ENV:Client` fault is set on the
    /// request and a protocol error returned.
    pub fn deserialize(
        &self,
        request: &mut ServiceRequest<T>,
        message: &SoapMessage,
        namespace: &str,
    ) -> Result<(), XRoadError> {
        debug!(namespace, "Deserialize SOAP body");
        let service_code = request
            .header
            .service_code()
            .ok_or_else(|| XRoadError::MissingMember("producer".to_string()))?
            .to_string();

        let matches = message.body().elements_by_name_ns(namespace, &service_code);
        let element = match matches.as_slice() {
            [element] => *element,
            _ => {
                let reason = missing_request_reason(message, namespace, &service_code);
                warn!(service_code = %service_code, reason, "Service request element was not deserialized");
                request.error_message = Some(ErrorMessage::standard(FAULT_CODE_CLIENT, reason, None, None));
                return Err(XRoadError::Protocol("Request body was not found.".to_string()));
            }
        };
        debug!(service_code = %service_code, "Found service request element");

        let payload = if request.policy.process_wrappers {
            trace!("Processing \"request\" wrapper in request message");
            element.child(ELEM_REQUEST)
        } else {
            Some(element)
        };
        request.request_data = (self.parser)(payload)?;

        if let Some(producer) = request.header.producer.as_mut() {
            producer.set_namespace(element.namespace.as_deref(), element.prefix.as_deref());
        }
        debug!("SOAP body was deserialized");
        Ok(())
    }
}

fn missing_request_reason(message: &SoapMessage, namespace: &str, service_code: &str) -> &'static str {
    if namespace != ANY_NAMESPACE {
        debug!("No service request element was found, trying again without namespace URI");
        let any = message.body().elements_by_name_ns(ANY_NAMESPACE, service_code);
        if let [element] = any.as_slice() {
            warn!(found = ?element.namespace, "Service request element was found with wrong namespace URI");
            return "Wrong namespace URI.";
        }
    }
    "Request body is missing."
}
