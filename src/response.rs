//! Response body codec.
//!
//! A serialized response has exactly one of three body shapes: a normal
//! `<serviceCode>Response` element, the same element carrying an in-band
//! `faultcode`/`faultstring` pair, or a standard SOAP `Fault` with no header.
//! Serialization never fails outward; any problem while composing the body
//! degrades to a `SOAP-ENV:Server` fault.

use crate::constants::*;
use crate::envelope::SoapMessage;
use crate::error::XRoadError;
use crate::header::{deserialize_header, serialize_header, IdentifierMode};
use crate::message::{ErrorMessage, ServiceRequest, ServiceResponse, WrapperPolicy};
use crate::request::RequestParser;
use crate::xml::{nodes_to_map, Element};
use tracing::{debug, error, info, trace, warn};

/// Writes the response payload into its root element.
pub type ResponseWriter<Req, Resp> =
    Box<dyn Fn(&ServiceResponse<Req, Resp>, &mut Element) -> Result<(), XRoadError> + Send + Sync>;

/// Writes a fault `detail` value into the `detail` element.
pub type FaultDetailWriter = Box<dyn Fn(&str, &mut Element) -> Result<(), XRoadError> + Send + Sync>;

/// Parses a response payload node, with the whole message for context.
pub type ResponseParser<T> =
    Box<dyn Fn(Option<&Element>, &SoapMessage) -> Result<Option<T>, XRoadError> + Send + Sync>;

/// Reads the `detail` element of a SOAP fault.
pub type FaultDetailParser = Box<dyn Fn(Option<&Element>) -> Option<String> + Send + Sync>;

const INTERNAL_SERVER_ERROR: &str = "Internal server error.";

// ============================================================================
// Serializer
// ============================================================================

/// Serializes responses.
pub struct ServiceResponseSerializer<Req, Resp> {
    writer: ResponseWriter<Req, Resp>,
    detail_writer: FaultDetailWriter,
}

impl<Req, Resp> ServiceResponseSerializer<Req, Resp> {
    pub fn new<F>(writer: F) -> Self
    where
        F: Fn(&ServiceResponse<Req, Resp>, &mut Element) -> Result<(), XRoadError> + Send + Sync + 'static,
    {
        Self {
            writer: Box::new(writer),
            detail_writer: Box::new(|detail, element| {
                if !detail.is_empty() {
                    element.add_text(detail);
                }
                Ok(())
            }),
        }
    }

    /// A serializer with no payload writer, used for fault-only replies.
    pub fn empty() -> Self {
        Self::new(|_, _| Ok(()))
    }

    /// Replace the default `detail` writer, which emits the value as text.
    pub fn with_detail_writer<F>(mut self, detail_writer: F) -> Self
    where
        F: Fn(&str, &mut Element) -> Result<(), XRoadError> + Send + Sync + 'static,
    {
        self.detail_writer = Box::new(detail_writer);
        self
    }

    /// Serialize the reply to `request`, which was read from `inbound`.
    ///
    /// The response processes wrappers the same way the request did.
    pub fn serialize_reply<T>(
        &self,
        response: &mut ServiceResponse<Req, Resp>,
        request: &ServiceRequest<T>,
        inbound: &SoapMessage,
    ) -> SoapMessage {
        debug!("Setting response to process wrappers in the same way as in request");
        response.policy.process_wrappers = request.policy.process_wrappers;
        self.serialize(response, Some(inbound))
    }

    /// Serialize `response`.
    ///
    /// With an inbound message the header is copied from it and its request
    /// element echoed; without one the header is generated from the response.
    pub fn serialize(&self, response: &mut ServiceResponse<Req, Resp>, inbound: Option<&SoapMessage>) -> SoapMessage {
        debug!(message_id = ?response.id(), "Serialize ServiceResponse message to SOAP");
        if let Some(error @ ErrorMessage::Standard { .. }) = &response.error_message {
            warn!("Standard SOAP error detected, SOAP header is skipped");
            return self.fault_message(error);
        }

        match self.serialize_normal(response, inbound) {
            Ok(message) => {
                debug!("ServiceResponse message was serialized");
                message
            }
            Err(e) => {
                error!(error = %e, "Response body could not be generated, returning SOAP Fault");
                let fault = ErrorMessage::standard(
                    FAULT_CODE_SERVER,
                    INTERNAL_SERVER_ERROR,
                    Some(String::new()),
                    Some(String::new()),
                );
                let message = self.fault_message(&fault);
                response.error_message = Some(fault);
                message
            }
        }
    }

    /// A header-less message whose body is a SOAP `Fault`.
    pub fn fault_message(&self, error: &ErrorMessage) -> SoapMessage {
        debug!("Generate SOAP Fault");
        let mut fault = Element::qualified(ELEM_FAULT, Some(SOAP_ENV_PREFIX), SOAP_ENV_URL);
        if let Some(code) = error.fault_code() {
            fault.add_child(text_element(ELEM_FAULT_CODE, code));
        }
        if let Some(string) = error.fault_string() {
            fault.add_child(text_element(ELEM_FAULT_STRING, string));
        }
        if let Some(actor) = error.fault_actor() {
            fault.add_child(text_element(ELEM_FAULT_ACTOR, actor));
        }
        if let Some(detail) = error.detail() {
            let element = fault.add_child(Element::new(ELEM_FAULT_DETAIL));
            if let Err(e) = (self.detail_writer)(detail, element) {
                warn!(error = %e, "Fault detail writer failed, using plain text");
                element.children.clear();
                element.add_text(detail);
            }
        }

        let mut message = SoapMessage::without_header();
        message.body_mut().add_child(fault);
        message
    }

    fn serialize_normal(
        &self,
        response: &ServiceResponse<Req, Resp>,
        inbound: Option<&SoapMessage>,
    ) -> Result<SoapMessage, XRoadError> {
        let policy = response.policy;
        let (_, producer) = response.header.require_members()?;
        let namespace = producer.namespace();
        if policy.any_namespace_flag() && namespace.is_none() {
            return Err(XRoadError::Protocol(
                "Producer namespace URI can't be null or empty.".to_string(),
            ));
        }
        debug!(namespace = ?namespace, "Generate SOAP body");
        let target = Namespace {
            url: namespace,
            prefix: producer.namespace_prefix.as_deref(),
        };

        let mut message = match inbound {
            Some(inbound) => inbound.clone_without_body(),
            None => {
                let mut message = SoapMessage::new();
                serialize_header(&response.header, response.error_message.as_ref(), &mut message)?;
                message
            }
        };

        let name = format!("{}{}", producer.service_code, RESPONSE_SUFFIX);
        let mut service_response = match target.url {
            Some(url) if policy.add_ns_to_service_response => Element::qualified(name, target.prefix, url),
            _ => Element::new(name),
        };

        if policy.process_wrappers {
            debug!("Adding \"request\" and \"response\" wrappers to response message");
            service_response.add_child(request_node(&policy, inbound, &producer.service_code, &target));
            let root = service_response.add_child(Element::new(ELEM_RESPONSE));
            self.write_payload(response, root, &target)?;
        } else {
            debug!("Skipping \"request\" and \"response\" wrappers in response message");
            self.write_payload(response, &mut service_response, &target)?;
        }

        message.body_mut().add_child(service_response);
        Ok(message)
    }

    fn write_payload(
        &self,
        response: &ServiceResponse<Req, Resp>,
        root: &mut Element,
        target: &Namespace<'_>,
    ) -> Result<(), XRoadError> {
        let policy = response.policy;
        if let Some(ErrorMessage::NonTechnical { fault_code, fault_string }) = &response.error_message {
            if policy.add_ns_to_response {
                target.apply(root);
            }
            warn!("Non-technical SOAP error detected");
            if let Some(code) = fault_code {
                root.add_child(text_element(ELEM_FAULT_CODE, code));
            }
            if let Some(string) = fault_string {
                root.add_child(text_element(ELEM_FAULT_STRING, string));
            }
            return Ok(());
        }

        match (policy.add_ns_to_response, policy.force_ns_on_children) {
            (true, false) => {
                target.apply(root);
                (self.writer)(response, root)
            }
            (true, true) => {
                debug!("Add producer namespace to all the response element's child elements");
                (self.writer)(response, root)?;
                target.apply(root);
                Ok(())
            }
            (false, _) => (self.writer)(response, root),
        }
    }
}

/// Producer namespace used while composing a body.
struct Namespace<'a> {
    url: Option<&'a str>,
    prefix: Option<&'a str>,
}

impl Namespace<'_> {
    fn apply(&self, element: &mut Element) {
        if let Some(url) = self.url {
            element.apply_namespace(self.prefix, url);
        }
    }
}

/// Echo of the inbound `request` element, or an empty one when it can't be found.
fn request_node(
    policy: &WrapperPolicy,
    inbound: Option<&SoapMessage>,
    service_code: &str,
    target: &Namespace<'_>,
) -> Element {
    let copied = inbound.and_then(|message| {
        let services: Vec<&Element> = message
            .body()
            .child_elements()
            .filter(|element| element.name == service_code)
            .collect();
        match services.as_slice() {
            [service] => service
                .child(ELEM_REQUEST)
                .map(|request| (request.clone(), service.namespace.clone())),
            _ => None,
        }
    });

    let (mut request, source_namespace) = match copied {
        Some(found) => {
            trace!("Copying request element from the inbound message");
            found
        }
        None => {
            debug!("Request element not found in the inbound message, creating an empty one");
            (Element::new(ELEM_REQUEST), None)
        }
    };

    if policy.add_ns_to_request {
        debug!("Add producer namespace to request element");
        target.apply(&mut request);
    } else {
        for namespace in source_namespace.as_deref().into_iter().chain(target.url) {
            request.strip_namespace(namespace);
        }
    }
    request
}

fn text_element(name: &str, value: &str) -> Element {
    let mut element = Element::new(name);
    if !value.is_empty() {
        element.add_text(value);
    }
    element
}

// ============================================================================
// Deserializer
// ============================================================================

/// Deserializes responses.
pub struct ServiceResponseDeserializer<Req, Resp> {
    request_parser: RequestParser<Req>,
    response_parser: ResponseParser<Resp>,
    detail_parser: FaultDetailParser,
    meta_service: bool,
    mode: IdentifierMode,
}

impl<Req, Resp> ServiceResponseDeserializer<Req, Resp> {
    pub fn new<P, R>(request_parser: P, response_parser: R) -> Self
    where
        P: Fn(Option<&Element>) -> Result<Option<Req>, XRoadError> + Send + Sync + 'static,
        R: Fn(Option<&Element>, &SoapMessage) -> Result<Option<Resp>, XRoadError> + Send + Sync + 'static,
    {
        Self {
            request_parser: Box::new(request_parser),
            response_parser: Box::new(response_parser),
            detail_parser: Box::new(|node| node.map(Element::text_content)),
            meta_service: false,
            mode: IdentifierMode::default(),
        }
    }

    /// Skip the in-band fault check; meta-service responses never carry one.
    pub fn meta_service(mut self) -> Self {
        self.meta_service = true;
        self
    }

    pub fn with_detail_parser<F>(mut self, detail_parser: F) -> Self
    where
        F: Fn(Option<&Element>) -> Option<String> + Send + Sync + 'static,
    {
        self.detail_parser = Box::new(detail_parser);
        self
    }

    pub fn with_identifier_mode(mut self, mode: IdentifierMode) -> Self {
        self.mode = mode;
        self
    }

    /// Deserialize `message`, looking for the response element in `namespace` (`*` for any).
    pub fn deserialize(
        &self,
        message: &SoapMessage,
        namespace: &str,
        process_wrappers: bool,
    ) -> Result<ServiceResponse<Req, Resp>, XRoadError> {
        debug!(namespace, "Deserialize SOAP message");
        let header = deserialize_header(message.header(), self.mode)?;
        let mut response = ServiceResponse::from_header(header);
        response.policy.process_wrappers = process_wrappers;

        match self.deserialize_body(&mut response, message, namespace) {
            Ok(true) => Ok(response),
            Ok(false) => {
                warn!("Service response element was not deserialized");
                Err(XRoadError::Protocol("Service response element was not found.".to_string()))
            }
            Err(XRoadError::MissingMember(reason)) => {
                warn!(reason = %reason, "Producer missing, looking for a SOAP Fault");
                if self.deserialize_fault(&mut response, message) {
                    Ok(response)
                } else {
                    Err(XRoadError::MissingMember(reason))
                }
            }
            Err(e) => Err(e),
        }
    }

    fn deserialize_body(
        &self,
        response: &mut ServiceResponse<Req, Resp>,
        message: &SoapMessage,
        namespace: &str,
    ) -> Result<bool, XRoadError> {
        let service_code = response.header.service_code().ok_or_else(|| {
            XRoadError::MissingMember("Producer is null. SOAP header is probably missing.".to_string())
        })?;
        let name = format!("{}{}", service_code, RESPONSE_SUFFIX);
        let matches = message.body().elements_by_name_ns(namespace, &name);

        let element = match matches.as_slice() {
            [element] => *element,
            _ => {
                diagnose_missing(message, namespace, &name, matches.len());
                if self.deserialize_fault(response, message) {
                    warn!("Standard SOAP error message found inside SOAP Body");
                    return Ok(true);
                }
                return Ok(false);
            }
        };
        debug!(element = %name, "Found service response element");

        let response_node = if response.policy.process_wrappers {
            debug!("Processing \"request\" and \"response\" wrappers in response message");
            response.request_data = (self.request_parser)(element.child(ELEM_REQUEST))?;
            element.child(ELEM_RESPONSE)
        } else {
            Some(element)
        };

        match response_node.and_then(|node| self.non_technical_error(node)) {
            Some(error) => {
                warn!("A non-technical SOAP error message was found instead of response");
                response.error_message = Some(error);
            }
            None => response.response_data = (self.response_parser)(response_node, message)?,
        }

        if let Some(producer) = response.header.producer.as_mut() {
            producer.set_namespace(element.namespace.as_deref(), element.prefix.as_deref());
        }
        debug!("SOAP body was deserialized");
        Ok(true)
    }

    fn non_technical_error(&self, node: &Element) -> Option<ErrorMessage> {
        if self.meta_service {
            trace!("Meta service response, skipping non-technical error check");
            return None;
        }
        let mut fault_code = None;
        let mut fault_string = None;
        for child in node.child_elements() {
            if child.name.eq_ignore_ascii_case(ELEM_FAULT_CODE) {
                fault_code = Some(child.text_content());
            } else if child.name.eq_ignore_ascii_case(ELEM_FAULT_STRING) {
                fault_string = Some(child.text_content());
            }
        }
        if fault_code.is_none() && fault_string.is_none() {
            return None;
        }
        Some(ErrorMessage::NonTechnical { fault_code, fault_string })
    }

    fn deserialize_fault(&self, response: &mut ServiceResponse<Req, Resp>, message: &SoapMessage) -> bool {
        let faults = message.body().elements_by_name_ns(ANY_NAMESPACE, ELEM_FAULT);
        let [fault] = faults.as_slice() else {
            debug!("SOAP fault was not found");
            return false;
        };
        response.error_message = Some(read_fault(fault, &self.detail_parser));
        info!("SOAP fault was deserialized");
        true
    }
}

/// Read a SOAP `Fault` element; `detail` is handed to `detail_parser`.
pub fn read_fault(fault: &Element, detail_parser: impl Fn(Option<&Element>) -> Option<String>) -> ErrorMessage {
    let mut fields = nodes_to_map(fault, true);
    ErrorMessage::Standard {
        fault_code: fields.remove("FAULTCODE"),
        fault_string: fields.remove("FAULTSTRING"),
        fault_actor: fields.remove("FAULTACTOR"),
        detail: detail_parser(fault.child(ELEM_FAULT_DETAIL)),
    }
}

fn diagnose_missing(message: &SoapMessage, namespace: &str, name: &str, count: usize) {
    if count > 1 {
        warn!(element = name, count, "Service response element occurs more than once");
    } else if namespace != ANY_NAMESPACE
        && message.body().elements_by_name_ns(ANY_NAMESPACE, name).len() == 1
    {
        warn!(element = name, namespace, "Service response element was found with wrong namespace URI");
    } else {
        debug!(element = name, "Service response element is missing");
    }
}
