//! Header codec: X-Road SOAP header to and from [`MessageHeader`].
//!
//! Serialization writes `client`, `service`, `securityServer`, `userId`, `id`,
//! `issue`, `securityToken` and `protocolVersion` in that order. Parsing is
//! lenient: every scalar is optional and a missing `client` or `service`
//! element leaves the member unset instead of failing the whole header.

use crate::constants::*;
use crate::envelope::SoapMessage;
use crate::error::XRoadError;
use crate::member::{ConsumerMember, ObjectType, ProducerMember, SecurityServer};
use crate::message::{ErrorMessage, MessageHeader};
use crate::xml::{nodes_to_map, Element};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// How identifiers rebuilt from a header treat missing mandatory fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierMode {
    /// Log the gap and keep going with an empty value
    #[default]
    Permissive,
    /// Reject the identifier with a validation error
    Strict,
}

// ============================================================================
// Serialization
// ============================================================================

/// Write the X-Road header of a message into `message`.
///
/// Nothing is written when `error` is a standard fault; that shape has no header.
pub fn serialize_header(
    header: &MessageHeader,
    error: Option<&ErrorMessage>,
    message: &mut SoapMessage,
) -> Result<(), XRoadError> {
    if error.is_some_and(ErrorMessage::is_standard) {
        warn!("Standard SOAP error detected, SOAP header is skipped");
        return Ok(());
    }
    let (consumer, producer) = header.require_members()?;
    let id = header
        .id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or(XRoadError::Validation { field: "id" })?;

    debug!(message_id = %id, service = %producer, "Generating SOAP header");
    message.declare_namespace(NS_ID_PREFIX, NS_ID_URL);
    message.declare_namespace(NS_XRD_PREFIX, NS_XRD_URL);

    let token = header.security_token.as_deref().filter(|t| !t.is_empty());
    if token.is_some() {
        message.declare_namespace(NS_EXT_SECURITY_TOKEN_PREFIX, NS_EXT_SECURITY_TOKEN_URL);
    }

    let soap_header = message.header_mut();
    soap_header.add_child(client_element(consumer));
    soap_header.add_child(service_element(producer));
    if let Some(server) = &header.security_server {
        soap_header.add_child(security_server_element(server));
    }
    if let Some(user_id) = non_empty(&header.user_id) {
        soap_header.add_child(xrd_element(ELEM_USER_ID).with_text(user_id));
    }
    soap_header.add_child(xrd_element(ELEM_ID).with_text(id));
    if let Some(issue) = non_empty(&header.issue) {
        soap_header.add_child(xrd_element(ELEM_ISSUE).with_text(issue));
    }
    if let Some(token) = token {
        let mut element = Element::qualified(
            ELEM_SECURITY_TOKEN,
            Some(NS_EXT_SECURITY_TOKEN_PREFIX),
            NS_EXT_SECURITY_TOKEN_URL,
        );
        if let Some(token_type) = non_empty(&header.security_token_type) {
            element.set_attribute_ns(
                NS_EXT_SECURITY_TOKEN_PREFIX,
                NS_EXT_SECURITY_TOKEN_URL,
                ATTR_TOKEN_TYPE,
                token_type,
            );
        }
        soap_header.add_child(element.with_text(token));
    }
    let protocol_version = if header.protocol_version.is_empty() {
        DEFAULT_PROTOCOL_VERSION
    } else {
        header.protocol_version.as_str()
    };
    soap_header.add_child(xrd_element(ELEM_PROTOCOL_VERSION).with_text(protocol_version));

    debug!("SOAP header was generated");
    Ok(())
}

fn client_element(consumer: &ConsumerMember) -> Element {
    let object_type = if consumer.subsystem_code.is_some() {
        ObjectType::Subsystem
    } else {
        ObjectType::Member
    };
    let mut client = identifier_element(ELEM_CLIENT, object_type);
    client.add_child(id_element(ELEM_XROAD_INSTANCE, &consumer.instance));
    client.add_child(id_element(ELEM_MEMBER_CLASS, &consumer.member_class));
    client.add_child(id_element(ELEM_MEMBER_CODE, &consumer.member_code));
    if let (ObjectType::Subsystem, Some(subsystem)) = (object_type, &consumer.subsystem_code) {
        client.add_child(id_element(ELEM_SUBSYSTEM_CODE, subsystem));
    }
    client
}

fn service_element(producer: &ProducerMember) -> Element {
    let mut service = identifier_element(ELEM_SERVICE, producer_object_type(producer));
    service.add_child(id_element(ELEM_XROAD_INSTANCE, &producer.instance));
    if let (Some(class), Some(code)) = (&producer.member_class, &producer.member_code) {
        service.add_child(id_element(ELEM_MEMBER_CLASS, class));
        service.add_child(id_element(ELEM_MEMBER_CODE, code));
    }
    if let Some(subsystem) = non_empty(&producer.subsystem_code) {
        service.add_child(id_element(ELEM_SUBSYSTEM_CODE, subsystem));
    }
    service.add_child(id_element(ELEM_SERVICE_CODE, &producer.service_code));
    if let Some(version) = non_empty(&producer.service_version) {
        service.add_child(id_element(ELEM_SERVICE_VERSION, version));
    }
    service
}

fn security_server_element(server: &SecurityServer) -> Element {
    let mut element = identifier_element(ELEM_SECURITY_SERVER, ObjectType::Server);
    element.add_child(id_element(ELEM_XROAD_INSTANCE, &server.instance));
    element.add_child(id_element(ELEM_MEMBER_CLASS, &server.member_class));
    element.add_child(id_element(ELEM_MEMBER_CODE, &server.member_code));
    element.add_child(id_element(ELEM_SERVER_CODE, &server.server_code));
    element
}

/// `SERVICE` when the producer names a member, `CENTRALSERVICE` otherwise.
fn producer_object_type(producer: &ProducerMember) -> ObjectType {
    if producer.member_class.is_some() && producer.member_code.is_some() {
        ObjectType::Service
    } else {
        ObjectType::CentralService
    }
}

fn identifier_element(name: &str, object_type: ObjectType) -> Element {
    let mut element = xrd_element(name);
    element.set_attribute_ns(NS_ID_PREFIX, NS_ID_URL, ATTR_OBJECT_TYPE, object_type.as_str());
    element
}

fn xrd_element(name: &str) -> Element {
    Element::qualified(name, Some(NS_XRD_PREFIX), NS_XRD_URL)
}

fn id_element(name: &str, value: &str) -> Element {
    Element::qualified(name, Some(NS_ID_PREFIX), NS_ID_URL).with_text(value)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

// ============================================================================
// Deserialization
// ============================================================================

/// Read the X-Road fields of a SOAP header.
///
/// An absent or empty header yields default fields. A missing `client` or
/// `service` element leaves that member `None`; check with
/// [`MessageHeader::require_members`].
pub fn deserialize_header(
    header: Option<&Element>,
    mode: IdentifierMode,
) -> Result<MessageHeader, XRoadError> {
    let mut fields = MessageHeader::default();
    let header = match header {
        Some(header) if header.has_children() => header,
        _ => {
            debug!("SOAP header is empty");
            return Ok(fields);
        }
    };

    fields.consumer = optional_member(deserialize_consumer(header, mode))?;
    fields.producer = optional_member(deserialize_producer(header, mode))?;
    fields.security_server = deserialize_security_server(header, mode)?;
    fields.id = text_of(header, NS_XRD_URL, ELEM_ID);
    fields.user_id = text_of(header, NS_XRD_URL, ELEM_USER_ID);
    fields.issue = text_of(header, NS_XRD_URL, ELEM_ISSUE);
    if let Some(version) = text_of(header, NS_XRD_URL, ELEM_PROTOCOL_VERSION) {
        fields.protocol_version = version;
    }

    if let Some(hash) = single(header, NS_XRD_URL, ELEM_REQUEST_HASH) {
        fields.request_hash = Some(hash.text_content());
        fields.request_hash_algorithm = hash.attribute(ATTR_ALGORITHM_ID).map(String::from);
    }

    if let Some(token) = single(header, NS_EXT_SECURITY_TOKEN_URL, ELEM_SECURITY_TOKEN) {
        fields.security_token = Some(token.text_content());
        fields.security_token_type = token
            .attribute(ATTR_TOKEN_TYPE)
            .or_else(|| token.attribute_ns(NS_EXT_SECURITY_TOKEN_URL, ATTR_TOKEN_TYPE))
            .map(String::from);
    }

    Ok(fields)
}

fn optional_member<M>(result: Result<M, XRoadError>) -> Result<Option<M>, XRoadError> {
    match result {
        Ok(member) => Ok(Some(member)),
        Err(XRoadError::MissingMember(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Rebuild the consumer from the `client` element.
pub fn deserialize_consumer(header: &Element, mode: IdentifierMode) -> Result<ConsumerMember, XRoadError> {
    debug!(element = ELEM_CLIENT, "Deserialize");
    let client = single(header, NS_XRD_URL, ELEM_CLIENT).ok_or_else(|| {
        warn!(element = ELEM_CLIENT, "Element missing from SOAP header");
        XRoadError::MissingMember("Client element is missing from SOAP header.".to_string())
    })?;
    trace!(element = ELEM_CLIENT, "Element found");
    let map = nodes_to_map(client, false);
    let object_type = read_object_type(client)?.unwrap_or_else(|| {
        warn!(element = ELEM_CLIENT, "objectType attribute missing, inferring from fields");
        if map.contains_key(ELEM_SUBSYSTEM_CODE) {
            ObjectType::Subsystem
        } else {
            ObjectType::Member
        }
    });
    consumer_from_map(&map, object_type, mode)
}

/// Rebuild the producer from the `service` element.
pub fn deserialize_producer(header: &Element, mode: IdentifierMode) -> Result<ProducerMember, XRoadError> {
    debug!(element = ELEM_SERVICE, "Deserialize");
    let service = single(header, NS_XRD_URL, ELEM_SERVICE).ok_or_else(|| {
        warn!(element = ELEM_SERVICE, "Element missing from SOAP header");
        XRoadError::MissingMember("Service element is missing from SOAP header.".to_string())
    })?;
    trace!(element = ELEM_SERVICE, "Element found");
    let map = nodes_to_map(service, false);
    let object_type = read_object_type(service)?.unwrap_or_else(|| {
        warn!(element = ELEM_SERVICE, "objectType attribute missing, inferring from fields");
        if map.contains_key(ELEM_MEMBER_CLASS) {
            ObjectType::Service
        } else {
            ObjectType::CentralService
        }
    });
    producer_from_map(&map, object_type, mode)
}

/// Rebuild the security server, if the header names one.
pub fn deserialize_security_server(
    header: &Element,
    mode: IdentifierMode,
) -> Result<Option<SecurityServer>, XRoadError> {
    match single(header, NS_XRD_URL, ELEM_SECURITY_SERVER) {
        Some(server) => {
            trace!(element = ELEM_SECURITY_SERVER, "Element found");
            security_server_from_map(&nodes_to_map(server, false), mode).map(Some)
        }
        None => Ok(None),
    }
}

/// `objectType` attribute in the identifiers namespace.
pub fn read_object_type(element: &Element) -> Result<Option<ObjectType>, XRoadError> {
    element
        .attribute_ns(NS_ID_URL, ATTR_OBJECT_TYPE)
        .map(str::parse::<ObjectType>)
        .transpose()
}

/// Build a consumer from a flattened identifier element.
pub fn consumer_from_map(
    map: &HashMap<String, String>,
    object_type: ObjectType,
    mode: IdentifierMode,
) -> Result<ConsumerMember, XRoadError> {
    let instance = required(map, ELEM_XROAD_INSTANCE, mode)?;
    let member_class = required(map, ELEM_MEMBER_CLASS, mode)?;
    let member_code = required(map, ELEM_MEMBER_CODE, mode)?;
    let subsystem = if object_type == ObjectType::Member {
        None
    } else {
        Some(required(map, ELEM_SUBSYSTEM_CODE, mode)?)
    };
    let mut consumer = ConsumerMember::unchecked(instance, member_class, member_code, subsystem);
    consumer.object_type = object_type;
    debug!(object_type = %object_type, consumer = %consumer, "ConsumerMember created");
    Ok(consumer)
}

/// Build a producer from a flattened identifier element.
pub fn producer_from_map(
    map: &HashMap<String, String>,
    object_type: ObjectType,
    mode: IdentifierMode,
) -> Result<ProducerMember, XRoadError> {
    let instance = required(map, ELEM_XROAD_INSTANCE, mode)?;
    let mut producer = if object_type == ObjectType::Service {
        ProducerMember::unchecked_service(
            instance,
            required(map, ELEM_MEMBER_CLASS, mode)?,
            required(map, ELEM_MEMBER_CODE, mode)?,
            optional(map, ELEM_SUBSYSTEM_CODE),
            required(map, ELEM_SERVICE_CODE, mode)?,
            optional(map, ELEM_SERVICE_VERSION),
        )
    } else {
        ProducerMember::unchecked_central(instance, required(map, ELEM_SERVICE_CODE, mode)?)
    };
    producer.object_type = object_type;
    debug!(object_type = %object_type, producer = %producer, "ProducerMember created");
    Ok(producer)
}

/// Build a security server from a flattened identifier element.
pub fn security_server_from_map(
    map: &HashMap<String, String>,
    mode: IdentifierMode,
) -> Result<SecurityServer, XRoadError> {
    let server = SecurityServer::unchecked(
        required(map, ELEM_XROAD_INSTANCE, mode)?,
        required(map, ELEM_MEMBER_CLASS, mode)?,
        required(map, ELEM_MEMBER_CODE, mode)?,
        required(map, ELEM_SERVER_CODE, mode)?,
    );
    debug!(server = %server, "SecurityServer created");
    Ok(server)
}

fn required(
    map: &HashMap<String, String>,
    field: &'static str,
    mode: IdentifierMode,
) -> Result<String, XRoadError> {
    match map.get(field).filter(|v| !v.is_empty()) {
        Some(value) => Ok(value.clone()),
        None if mode == IdentifierMode::Strict => Err(XRoadError::Validation { field }),
        None => {
            warn!(field, "Identifier field was not found");
            Ok(map.get(field).cloned().unwrap_or_default())
        }
    }
}

fn optional(map: &HashMap<String, String>, field: &str) -> Option<String> {
    map.get(field).filter(|v| !v.is_empty()).cloned()
}

/// The single descendant matching `namespace`/`name`; none if absent or ambiguous.
fn single<'a>(parent: &'a Element, namespace: &str, name: &str) -> Option<&'a Element> {
    match parent.elements_by_name_ns(namespace, name).as_slice() {
        [element] => Some(*element),
        [] => {
            trace!(element = name, "Element was not found");
            None
        }
        _ => {
            warn!(element = name, "Element occurs more than once");
            None
        }
    }
}

fn text_of(parent: &Element, namespace: &str, name: &str) -> Option<String> {
    single(parent, namespace, name).map(Element::text_content)
}
