//! Namespace URIs, element names and other wire constants.
//!
//! These values must match other X-Road implementations bit for bit.

/// SOAP 1.1 envelope namespace.
pub const SOAP_ENV_URL: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_ENV_PREFIX: &str = "SOAP-ENV";
/// SOAP 1.2 envelope namespace (recognised only to be rejected).
pub const SOAP_12_ENV_URL: &str = "http://www.w3.org/2003/05/soap-envelope";

/// X-Road identifiers namespace.
pub const NS_ID_URL: &str = "http://x-road.eu/xsd/identifiers";
pub const NS_ID_PREFIX: &str = "id";
/// X-Road message protocol namespace.
pub const NS_XRD_URL: &str = "http://x-road.eu/xsd/xroad.xsd";
pub const NS_XRD_PREFIX: &str = "xrd";
/// Environmental monitoring namespace.
pub const NS_ENV_MONITORING_URL: &str = "http://x-road.eu/xsd/monitoring";
pub const NS_ENV_MONITORING_PREFIX: &str = "m";
/// Security token extension namespace.
pub const NS_EXT_SECURITY_TOKEN_URL: &str = "http://x-road.eu/xsd/security-token.xsd";
pub const NS_EXT_SECURITY_TOKEN_PREFIX: &str = "extsec";

/// Matches elements in any namespace.
pub const ANY_NAMESPACE: &str = "*";

// Attributes
pub const ATTR_OBJECT_TYPE: &str = "objectType";
pub const ATTR_ALGORITHM_ID: &str = "algorithmId";
pub const ATTR_TOKEN_TYPE: &str = "tokenType";

// Header elements
pub const ELEM_CLIENT: &str = "client";
pub const ELEM_SERVICE: &str = "service";
pub const ELEM_SECURITY_SERVER: &str = "securityServer";
pub const ELEM_CENTRAL_SERVICE: &str = "centralService";
pub const ELEM_CENTRAL_SERVICE_LIST: &str = "centralServiceList";
pub const ELEM_CLIENT_LIST: &str = "clientList";
pub const ELEM_ID: &str = "id";
pub const ELEM_USER_ID: &str = "userId";
pub const ELEM_ISSUE: &str = "issue";
pub const ELEM_REQUEST_HASH: &str = "requestHash";
pub const ELEM_PROTOCOL_VERSION: &str = "protocolVersion";
pub const ELEM_SECURITY_TOKEN: &str = "securityToken";

// Identifier elements
pub const ELEM_XROAD_INSTANCE: &str = "xRoadInstance";
pub const ELEM_MEMBER_CLASS: &str = "memberClass";
pub const ELEM_MEMBER_CODE: &str = "memberCode";
pub const ELEM_SUBSYSTEM_CODE: &str = "subsystemCode";
pub const ELEM_SERVICE_CODE: &str = "serviceCode";
pub const ELEM_SERVER_CODE: &str = "serverCode";
pub const ELEM_SERVICE_VERSION: &str = "serviceVersion";

// Body elements
pub const ELEM_REQUEST: &str = "request";
pub const ELEM_RESPONSE: &str = "response";
pub const RESPONSE_SUFFIX: &str = "Response";
pub const ELEM_FAULT: &str = "Fault";
pub const ELEM_FAULT_CODE: &str = "faultcode";
pub const ELEM_FAULT_STRING: &str = "faultstring";
pub const ELEM_FAULT_ACTOR: &str = "faultactor";
pub const ELEM_FAULT_DETAIL: &str = "detail";

// Environmental monitoring
pub const ELEM_MONITORING_PACKAGES: &str = "Packages";
pub const ELEM_MONITORING_METRIC_SET: &str = "metricSet";
pub const ELEM_MONITORING_STRING_METRIC: &str = "stringMetric";

// Meta services
pub const META_SERVICE_LIST_CLIENTS: &str = "listClients";
pub const META_SERVICE_LIST_CENTRAL_SERVICES: &str = "listCentralServices";
pub const META_SERVICE_LIST_METHODS: &str = "listMethods";
pub const META_SERVICE_ALLOWED_METHODS: &str = "allowedMethods";
pub const META_SERVICE_GET_SECURITY_SERVER_METRICS: &str = "getSecurityServerMetrics";

/// Protocol version written when the message does not set one.
pub const DEFAULT_PROTOCOL_VERSION: &str = "4.0";

// Standard fault codes
pub const FAULT_CODE_CLIENT: &str = "SOAP-ENV:Client";
pub const FAULT_CODE_SERVER: &str = "SOAP-ENV:Server";

// Content types
pub const TEXT_XML: &str = "text/xml";
pub const MULTIPART_RELATED: &str = "multipart/related";
