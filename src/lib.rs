//! X-Road SOAP message framing.
//!
//! Builds and parses X-Road SOAP envelopes: the standard header carrying the
//! consumer, producer and security server identifiers, and the body framing
//! around application payloads (`request`/`response` wrappers, producer
//! namespace placement, fault shapes).
//!
//! # Features
//!
//! - Header serialization and deserialization
//! - Request and response body codecs with pluggable payload hooks
//! - Standard and non-technical SOAP faults
//! - Meta-service decoders (`listClients`, `listMethods`, metrics, ...)
//! - An adapter pipeline that turns request bytes into a reply, always
//!   degrading to a SOAP fault
//!
//! # Example
//!
//! ```ignore
//! use xroad_soap::{Adapter, AdapterConfig, Service};
//!
//! let adapter = Adapter::new(AdapterConfig::load("adapter.yaml")?)
//!     .with_service("helloService", hello_service());
//! let outbound = adapter.process(&body, Some("text/xml; charset=UTF-8"));
//! ```

pub mod adapter;
pub mod config;
pub mod constants;
pub mod envelope;
pub mod error;
pub mod header;
pub mod member;
pub mod message;
pub mod meta;
pub mod request;
pub mod response;
pub mod xml;

pub use adapter::{Adapter, Outbound, Service, ServiceHandler};
pub use config::AdapterConfig;
pub use envelope::{Attachment, SoapMessage};
pub use error::XRoadError;
pub use header::IdentifierMode;
pub use member::{ConsumerMember, ObjectType, ProducerMember, SecurityServer};
pub use message::{generate_id, ErrorMessage, MessageHeader, ServiceRequest, ServiceResponse, WrapperPolicy};
pub use request::{CustomRequestDeserializer, ServiceRequestDeserializer, ServiceRequestSerializer};
pub use response::{ServiceResponseDeserializer, ServiceResponseSerializer};
pub use xml::Element;
