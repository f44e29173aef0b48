//! X-Road meta services.
//!
//! `listClients` and `listCentralServices` are plain XML documents fetched
//! from a security server; `listMethods`, `allowedMethods` and
//! `getSecurityServerMetrics` are SOAP services whose request body is a
//! single empty element.

use crate::constants::*;
use crate::envelope::SoapMessage;
use crate::error::XRoadError;
use crate::header::{consumer_from_map, producer_from_map, read_object_type, IdentifierMode};
use crate::member::{ConsumerMember, ObjectType, ProducerMember};
use crate::message::ServiceRequest;
use crate::request::ServiceRequestSerializer;
use crate::response::ServiceResponseDeserializer;
use crate::xml::{self, nodes_to_map, Element};
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

/// Namespace URI and prefix of a meta service's body elements.
///
/// `getSecurityServerMetrics` lives in the monitoring namespace, the rest in
/// the X-Road one.
pub fn service_namespace(service_code: &str) -> (&'static str, &'static str) {
    match service_code {
        META_SERVICE_GET_SECURITY_SERVER_METRICS => (NS_ENV_MONITORING_URL, NS_ENV_MONITORING_PREFIX),
        _ => (NS_XRD_URL, NS_XRD_PREFIX),
    }
}

/// Build the SOAP request for a meta service such as `listMethods`.
///
/// The body is a single empty `<serviceCode>` element in the service's
/// namespace.
pub fn meta_service_request(
    consumer: ConsumerMember,
    producer: ProducerMember,
    id: &str,
) -> Result<SoapMessage, XRoadError> {
    let (url, prefix) = service_namespace(&producer.service_code);
    let producer = producer.with_namespace(url, prefix);
    let request: ServiceRequest<()> = ServiceRequest::new(consumer, producer, id)?;
    ServiceRequestSerializer::empty().serialize(&request)
}

/// Decode a `listClients` document into consumers.
pub fn decode_list_clients(document: &str, mode: IdentifierMode) -> Result<Vec<ConsumerMember>, XRoadError> {
    debug!(service = META_SERVICE_LIST_CLIENTS, element = ELEM_CLIENT_LIST, "Deserialize");
    let root = xml::parse(document)?;
    let mut clients = Vec::new();
    for element in elements_including_root(&root, NS_XRD_URL, ELEM_ID) {
        let object_type = read_object_type(element)?.unwrap_or(ObjectType::Member);
        clients.push(consumer_from_map(&nodes_to_map(element, false), object_type, mode)?);
    }
    debug!(count = clients.len(), "Clients found");
    Ok(clients)
}

/// Decode a `listCentralServices` document into central-service producers.
pub fn decode_list_central_services(
    document: &str,
    mode: IdentifierMode,
) -> Result<Vec<ProducerMember>, XRoadError> {
    debug!(service = META_SERVICE_LIST_CENTRAL_SERVICES, element = ELEM_CENTRAL_SERVICE_LIST, "Deserialize");
    let root = xml::parse(document)?;
    let mut services = Vec::new();
    for element in elements_including_root(&root, NS_XRD_URL, ELEM_CENTRAL_SERVICE) {
        trace!(element = ELEM_CENTRAL_SERVICE, "Element found");
        let object_type = read_object_type(element)?.unwrap_or(ObjectType::CentralService);
        services.push(producer_from_map(&nodes_to_map(element, false), object_type, mode)?);
    }
    debug!(count = services.len(), "Central services found");
    Ok(services)
}

fn elements_including_root<'a>(root: &'a Element, namespace: &str, name: &str) -> Vec<&'a Element> {
    let mut found = Vec::new();
    if root.matches(namespace, name) {
        found.push(root);
    }
    found.extend(root.elements_by_name_ns(namespace, name));
    found
}

/// Deserializer for `listMethods` and `allowedMethods` responses.
///
/// Every `xrd:service` element in the body becomes a producer; entries that
/// can't be rebuilt are skipped.
pub fn list_methods_deserializer(mode: IdentifierMode) -> ServiceResponseDeserializer<(), Vec<ProducerMember>> {
    ServiceResponseDeserializer::new(
        |_: Option<&Element>| Ok(None),
        move |_: Option<&Element>, message: &SoapMessage| {
            let mut producers = Vec::new();
            for service in message.body().elements_by_name_ns(NS_XRD_URL, ELEM_SERVICE) {
                let map = nodes_to_map(service, false);
                let producer = read_object_type(service).and_then(|object_type| {
                    producer_from_map(&map, object_type.unwrap_or(ObjectType::Service), mode)
                });
                match producer {
                    Ok(producer) => producers.push(producer),
                    Err(e) => warn!(error = %e, "Skipping service entry"),
                }
            }
            Ok(Some(producers))
        },
    )
    .meta_service()
}

/// Deserializer for `getSecurityServerMetrics` responses; yields every `m:metricSet` element.
pub fn security_server_metrics_deserializer() -> ServiceResponseDeserializer<(), Vec<Element>> {
    ServiceResponseDeserializer::new(
        |_: Option<&Element>| Ok(None),
        |_: Option<&Element>, message: &SoapMessage| {
            let sets = message
                .body()
                .elements_by_name_ns(NS_ENV_MONITORING_URL, ELEM_MONITORING_METRIC_SET)
                .into_iter()
                .cloned()
                .collect();
            Ok(Some(sets))
        },
    )
    .meta_service()
}

/// X-Road package versions from the `Packages` metric sets.
///
/// Collects `stringMetric` entries whose name starts with `xroad-`.
pub fn xroad_version_info(metric_sets: &[Element]) -> BTreeMap<String, String> {
    let mut versions = BTreeMap::new();
    for set in metric_sets {
        let is_packages = set
            .child("name")
            .is_some_and(|name| name.text_content() == ELEM_MONITORING_PACKAGES);
        if !is_packages {
            continue;
        }
        for metric in set
            .child_elements()
            .filter(|element| element.name == ELEM_MONITORING_STRING_METRIC)
        {
            if let (Some(name), Some(value)) = (metric.child("name"), metric.child("value")) {
                let name = name.text_content();
                if name.starts_with("xroad-") {
                    debug!(package = %name, "X-Road package version info found");
                    versions.insert(name, value.text_content());
                }
            }
        }
    }
    versions
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST_CLIENTS: &str = r#"<ns2:clientList xmlns:ns1="http://x-road.eu/xsd/identifiers" xmlns:ns2="http://x-road.eu/xsd/xroad.xsd"><ns2:member><ns2:id ns1:objectType="MEMBER"><ns1:xRoadInstance>FI_PILOT</ns1:xRoadInstance><ns1:memberClass>GOV</ns1:memberClass><ns1:memberCode>0245437-2</ns1:memberCode></ns2:id><ns2:name>Valtiokonttori</ns2:name></ns2:member><ns2:member><ns2:id ns1:objectType="SUBSYSTEM"><ns1:xRoadInstance>FI_PILOT</ns1:xRoadInstance><ns1:memberClass>GOV</ns1:memberClass><ns1:memberCode>0245437-2</ns1:memberCode><ns1:subsystemCode>ConsumerService</ns1:subsystemCode></ns2:id><ns2:name>Valtiokonttori</ns2:name></ns2:member></ns2:clientList>"#;

    const LIST_CENTRAL_SERVICES: &str = r#"<xrd:centralServiceList xmlns:id="http://x-road.eu/xsd/identifiers" xmlns:xrd="http://x-road.eu/xsd/xroad.xsd"><xrd:centralService id:objectType="CENTRALSERVICE"><id:xRoadInstance>FI_PILOT</id:xRoadInstance><id:serviceCode>Test</id:serviceCode></xrd:centralService><xrd:centralService id:objectType="CENTRALSERVICE"><id:xRoadInstance>FI_PILOT</id:xRoadInstance><id:serviceCode>Test2</id:serviceCode></xrd:centralService></xrd:centralServiceList>"#;

    #[test]
    fn test_decode_list_clients() {
        let clients = decode_list_clients(LIST_CLIENTS, IdentifierMode::Permissive).unwrap();
        assert_eq!(clients.len(), 2);
        assert_eq!(clients[0].to_string(), "FI_PILOT.GOV.0245437-2");
        assert_eq!(clients[0].object_type, ObjectType::Member);
        assert_eq!(clients[1].to_string(), "FI_PILOT.GOV.0245437-2.ConsumerService");
        assert_eq!(clients[1].object_type, ObjectType::Subsystem);
    }

    #[test]
    fn test_decode_list_clients_empty() {
        let xml = r#"<ns2:clientList xmlns:ns2="http://x-road.eu/xsd/xroad.xsd"/>"#;
        assert!(decode_list_clients(xml, IdentifierMode::Permissive).unwrap().is_empty());
        assert!(decode_list_clients("<broken", IdentifierMode::Permissive).is_err());
    }

    #[test]
    fn test_decode_list_central_services() {
        let services = decode_list_central_services(LIST_CENTRAL_SERVICES, IdentifierMode::Strict).unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].to_string(), "FI_PILOT.Test");
        assert!(services[1].is_central_service());
    }

    #[test]
    fn test_meta_service_request() {
        let consumer = ConsumerMember::new("FI", "GOV", "MEMBER1").unwrap();
        let producer = ProducerMember::new("FI", "COM", "MEMBER2", META_SERVICE_ALLOWED_METHODS).unwrap();
        let message = meta_service_request(consumer, producer, "ID-1").unwrap();
        let xml = message.to_xml_string().unwrap();
        assert!(xml.ends_with("<SOAP-ENV:Body><xrd:allowedMethods/></SOAP-ENV:Body></SOAP-ENV:Envelope>"));
        assert!(xml.contains("<xrd:service id:objectType=\"SERVICE\">"));
    }

    #[test]
    fn test_metrics_request_uses_monitoring_namespace() {
        let consumer = ConsumerMember::new("FI", "GOV", "MEMBER1").unwrap();
        let producer =
            ProducerMember::new("FI", "COM", "MEMBER2", META_SERVICE_GET_SECURITY_SERVER_METRICS).unwrap();
        let message = meta_service_request(consumer, producer, "ID-2").unwrap();
        let xml = message.to_xml_string().unwrap();
        assert!(xml.ends_with(
            r#"<SOAP-ENV:Body><m:getSecurityServerMetrics xmlns:m="http://x-road.eu/xsd/monitoring"/></SOAP-ENV:Body></SOAP-ENV:Envelope>"#
        ));
        assert_eq!(service_namespace(META_SERVICE_LIST_METHODS), (NS_XRD_URL, NS_XRD_PREFIX));
    }

    fn list_methods_response() -> SoapMessage {
        let xml = r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/" xmlns:id="http://x-road.eu/xsd/identifiers" xmlns:xrd="http://x-road.eu/xsd/xroad.xsd"><SOAP-ENV:Header><xrd:client id:objectType="MEMBER"><id:xRoadInstance>FI</id:xRoadInstance><id:memberClass>GOV</id:memberClass><id:memberCode>MEMBER1</id:memberCode></xrd:client><xrd:service id:objectType="SERVICE"><id:xRoadInstance>FI</id:xRoadInstance><id:memberClass>COM</id:memberClass><id:memberCode>MEMBER2</id:memberCode><id:serviceCode>listMethods</id:serviceCode></xrd:service><xrd:id>ID-1</xrd:id><xrd:protocolVersion>4.0</xrd:protocolVersion></SOAP-ENV:Header><SOAP-ENV:Body><xrd:listMethodsResponse><xrd:service id:objectType="SERVICE"><id:xRoadInstance>FI</id:xRoadInstance><id:memberClass>COM</id:memberClass><id:memberCode>MEMBER2</id:memberCode><id:subsystemCode>subsystem</id:subsystemCode><id:serviceCode>getRandom</id:serviceCode><id:serviceVersion>v1</id:serviceVersion></xrd:service><xrd:service id:objectType="SERVICE"><id:xRoadInstance>FI</id:xRoadInstance><id:memberClass>COM</id:memberClass><id:memberCode>MEMBER2</id:memberCode><id:serviceCode>helloService</id:serviceCode></xrd:service><xrd:service id:objectType="BOGUS"/></xrd:listMethodsResponse></SOAP-ENV:Body></SOAP-ENV:Envelope>"#;
        SoapMessage::parse(xml).unwrap()
    }

    #[test]
    fn test_list_methods_deserializer() {
        let message = list_methods_response();
        let response = list_methods_deserializer(IdentifierMode::Permissive)
            .deserialize(&message, NS_XRD_URL, false)
            .unwrap();
        let producers = response.response_data.unwrap();
        assert_eq!(producers.len(), 2);
        assert_eq!(producers[0].to_string(), "FI.COM.MEMBER2.subsystem.getRandom.v1");
        assert_eq!(producers[1].to_string(), "FI.COM.MEMBER2.helloService");
    }

    #[test]
    fn test_metrics_version_info() {
        let xml = r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/" xmlns:id="http://x-road.eu/xsd/identifiers" xmlns:xrd="http://x-road.eu/xsd/xroad.xsd" xmlns:m="http://x-road.eu/xsd/monitoring"><SOAP-ENV:Header><xrd:client id:objectType="MEMBER"><id:xRoadInstance>FI</id:xRoadInstance><id:memberClass>GOV</id:memberClass><id:memberCode>MEMBER1</id:memberCode></xrd:client><xrd:service id:objectType="SERVICE"><id:xRoadInstance>FI</id:xRoadInstance><id:memberClass>COM</id:memberClass><id:memberCode>MEMBER2</id:memberCode><id:serviceCode>getSecurityServerMetrics</id:serviceCode></xrd:service><xrd:id>ID-1</xrd:id></SOAP-ENV:Header><SOAP-ENV:Body><m:getSecurityServerMetricsResponse><m:metricSet><m:name>SERVER:FI/COM/MEMBER2/server1</m:name><m:metricSet><m:name>Packages</m:name><m:stringMetric><m:name>xroad-proxy</m:name><m:value>6.19.0-1</m:value></m:stringMetric><m:stringMetric><m:name>openjdk</m:name><m:value>8u171</m:value></m:stringMetric></m:metricSet></m:metricSet></m:getSecurityServerMetricsResponse></SOAP-ENV:Body></SOAP-ENV:Envelope>"#;
        let message = SoapMessage::parse(xml).unwrap();
        let response = security_server_metrics_deserializer()
            .deserialize(&message, NS_ENV_MONITORING_URL, false)
            .unwrap();
        let sets = response.response_data.unwrap();
        assert_eq!(sets.len(), 2);

        let versions = xroad_version_info(&sets);
        assert_eq!(versions.len(), 1);
        assert_eq!(versions.get("xroad-proxy").map(String::as_str), Some("6.19.0-1"));
    }
}
