//! SOAP 1.1 envelope handling.
//!
//! A [`SoapMessage`] owns the envelope element, its optional header, its body
//! and any binary parts business logic attached to it. It lives for one
//! serialize or deserialize call and is never shared between messages.

use crate::constants::{
    MULTIPART_RELATED, SOAP_12_ENV_URL, SOAP_ENV_PREFIX, SOAP_ENV_URL, TEXT_XML,
};
use crate::error::XRoadError;
use crate::xml::{self, Element};

/// A binary part carried alongside the envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub content_id: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(content_id: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            content_id: content_id.into(),
            content_type: content_type.into(),
            data,
        }
    }
}

/// A SOAP envelope split into its three parts.
#[derive(Debug, Clone)]
pub struct SoapMessage {
    /// `Envelope` element; its children are kept in `header`/`body`.
    envelope: Element,
    header: Option<Element>,
    body: Element,
    attachments: Vec<Attachment>,
}

impl Default for SoapMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl SoapMessage {
    /// Empty envelope with a header and a body.
    pub fn new() -> Self {
        let mut message = Self::without_header();
        message.header = Some(soap_element("Header"));
        message
    }

    /// Empty envelope with a body only, the shape of a standard fault.
    pub fn without_header() -> Self {
        let mut envelope = soap_element("Envelope");
        envelope.declare_namespace(Some(SOAP_ENV_PREFIX), SOAP_ENV_URL);
        Self {
            envelope,
            header: None,
            body: soap_element("Body"),
            attachments: Vec::new(),
        }
    }

    /// Parse a SOAP 1.1 envelope.
    pub fn parse(xml: &str) -> Result<Self, XRoadError> {
        let mut envelope = xml::parse(xml)?;

        if envelope.name != "Envelope" {
            return Err(XRoadError::XmlParse("No valid SOAP Envelope found".to_string()));
        }
        match envelope.namespace.as_deref() {
            Some(SOAP_ENV_URL) => {}
            Some(SOAP_12_ENV_URL) => {
                return Err(XRoadError::XmlParse("SOAP 1.2 envelopes are not supported".to_string()))
            }
            _ => return Err(XRoadError::XmlParse("No valid SOAP Envelope found".to_string())),
        }

        let children = std::mem::take(&mut envelope.children);
        let mut header = None;
        let mut body = None;
        for child in children {
            if let xml::Node::Element(element) = child {
                if element.matches(SOAP_ENV_URL, "Header") && header.is_none() {
                    header = Some(element);
                } else if element.matches(SOAP_ENV_URL, "Body") && body.is_none() {
                    body = Some(element);
                }
            }
        }
        let body = body.ok_or_else(|| XRoadError::XmlParse("SOAP Body is missing".to_string()))?;

        Ok(Self {
            envelope,
            header,
            body,
            attachments: Vec::new(),
        })
    }

    /// Parse raw bytes, which must be UTF-8.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, XRoadError> {
        let xml = std::str::from_utf8(bytes)
            .map_err(|e| XRoadError::XmlParse(format!("Invalid UTF-8: {}", e)))?;
        Self::parse(xml)
    }

    /// Serialize without an XML declaration.
    pub fn to_xml_string(&self) -> Result<String, XRoadError> {
        let mut envelope = self.envelope.clone();
        if let Some(header) = &self.header {
            envelope.add_child(header.clone());
        }
        envelope.add_child(self.body.clone());
        xml::write(&envelope)
    }

    /// Same envelope and header, empty body, no attachments.
    pub fn clone_without_body(&self) -> Self {
        let mut body = self.body.clone();
        body.children.clear();
        Self {
            envelope: self.envelope.clone(),
            header: self.header.clone(),
            body,
            attachments: Vec::new(),
        }
    }

    pub fn envelope(&self) -> &Element {
        &self.envelope
    }

    /// Declare a namespace on the `Envelope` element.
    pub fn declare_namespace(&mut self, prefix: &str, uri: &str) {
        self.envelope.declare_namespace(Some(prefix), uri);
    }

    pub fn header(&self) -> Option<&Element> {
        self.header.as_ref()
    }

    /// The header, created if the envelope had none.
    pub fn header_mut(&mut self) -> &mut Element {
        self.header.get_or_insert_with(|| soap_element("Header"))
    }

    pub fn body(&self) -> &Element {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Element {
        &mut self.body
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }

    pub fn add_attachment(&mut self, attachment: Attachment) {
        self.attachments.push(attachment);
    }

    /// Content type for the transport layer.
    pub fn content_type(&self) -> String {
        if self.has_attachments() {
            format!("{}; type=\"{}\"", MULTIPART_RELATED, TEXT_XML)
        } else {
            format!("{}; charset=UTF-8", TEXT_XML)
        }
    }
}

fn soap_element(name: &str) -> Element {
    Element::qualified(name, Some(SOAP_ENV_PREFIX), SOAP_ENV_URL)
}
