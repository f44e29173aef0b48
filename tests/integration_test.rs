//! Integration tests for the xroad-soap crate.
//!
//! These tests exercise the public API surface end-to-end, combining the
//! header and body codecs, the adapter pipeline and configuration.

use xroad_soap::constants::{ANY_NAMESPACE, FAULT_CODE_CLIENT, FAULT_CODE_SERVER, META_SERVICE_ALLOWED_METHODS};
use xroad_soap::header::{deserialize_header, serialize_header};
use xroad_soap::meta::meta_service_request;
use xroad_soap::xml;
use xroad_soap::{
    Adapter, AdapterConfig, ConsumerMember, CustomRequestDeserializer, Element, ErrorMessage,
    IdentifierMode, MessageHeader, ObjectType, ProducerMember, SecurityServer, Service,
    ServiceRequest, ServiceRequestDeserializer, ServiceRequestSerializer, ServiceResponse,
    ServiceResponseDeserializer, ServiceResponseSerializer, SoapMessage, WrapperPolicy, XRoadError,
};

const PRODUCER_NS: &str = "http://test.x-road.fi/producer";

// ============================================================================
// Helpers: members, serializers and hello service
// ============================================================================

fn consumer() -> ConsumerMember {
    ConsumerMember::with_subsystem("FI", "GOV", "MEMBER1", "subsystem").unwrap()
}

fn producer(namespace: bool) -> ProducerMember {
    let producer = ProducerMember::new("FI", "COM", "MEMBER2", "getRandom")
        .unwrap()
        .with_version("v1")
        .unwrap();
    if namespace {
        producer.with_namespace(PRODUCER_NS, "ts")
    } else {
        producer
    }
}

fn data_request_serializer() -> ServiceRequestSerializer<String> {
    ServiceRequestSerializer::new(|request: &ServiceRequest<String>, root: &mut Element| {
        root.add_child(Element::new("data").with_text(request.request_data.clone().unwrap_or_default()));
        Ok(())
    })
}

fn data_response_serializer() -> ServiceResponseSerializer<String, String> {
    ServiceResponseSerializer::new(|response: &ServiceResponse<String, String>, root: &mut Element| {
        if let Some(data) = &response.response_data {
            root.add_child(Element::new("data").with_text(data.as_str()));
        }
        Ok(())
    })
}

fn data_response_deserializer() -> ServiceResponseDeserializer<String, String> {
    ServiceResponseDeserializer::new(
        |node: Option<&Element>| Ok(node.and_then(|n| n.child("data")).map(Element::text_content)),
        |node: Option<&Element>, _: &SoapMessage| Ok(node.and_then(|n| n.child("data")).map(Element::text_content)),
    )
}

fn body_xml(message: &SoapMessage) -> String {
    xml::write(message.body().child_elements().next().unwrap()).unwrap()
}

fn hello_service() -> Service<String, String> {
    let deserializer = CustomRequestDeserializer::new(|node: Option<&Element>| {
        Ok(node.and_then(|n| n.child("data")).map(Element::text_content))
    });
    let serializer = ServiceResponseSerializer::new(|response: &ServiceResponse<String, String>, root: &mut Element| {
        if let Some(message) = &response.response_data {
            root.add_child(Element::new("message").with_text(message.as_str()));
        }
        Ok(())
    });
    Service::new(deserializer, serializer, |request, response| {
        let name = request
            .request_data
            .as_deref()
            .and_then(|data| data.strip_prefix("name="))
            .unwrap_or("anonymous");
        response.response_data = Some(format!("Hello {}!", name));
        Ok(())
    })
}

fn hello_request(header: &str, body: &str) -> String {
    format!(
        r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/" xmlns:id="http://x-road.eu/xsd/identifiers" xmlns:xrd="http://x-road.eu/xsd/xroad.xsd"><SOAP-ENV:Header>{}<xrd:service id:objectType="SERVICE"><id:xRoadInstance>FI</id:xRoadInstance><id:memberClass>COM</id:memberClass><id:memberCode>MEMBER2</id:memberCode><id:serviceCode>helloService</id:serviceCode></xrd:service><xrd:id>ID-42</xrd:id><xrd:protocolVersion>4.0</xrd:protocolVersion></SOAP-ENV:Header><SOAP-ENV:Body>{}</SOAP-ENV:Body></SOAP-ENV:Envelope>"#,
        header, body
    )
}

const HELLO_CLIENT: &str = r#"<xrd:client id:objectType="MEMBER"><id:xRoadInstance>FI</id:xRoadInstance><id:memberClass>GOV</id:memberClass><id:memberCode>MEMBER1</id:memberCode></xrd:client>"#;

const HELLO_BODY: &str = "<helloService><request><data>name=Alice</data></request></helloService>";

fn fault_of(body: &str) -> Element {
    let message = SoapMessage::parse(body).unwrap();
    assert!(message.header().is_none());
    message.body().child("Fault").unwrap().clone()
}

// ============================================================================
// Header codec
// ============================================================================

#[test]
fn test_header_round_trip_is_stable() {
    let header = MessageHeader::new(consumer(), producer(false), "ID11234")
        .unwrap()
        .with_user_id("EE1234567890")
        .with_issue("12345")
        .with_security_server(SecurityServer::new("FI", "COM", "MEMBER2", "server1").unwrap())
        .with_security_token("jwt-token", Some("urn:ee:x-road:jwt".to_string()));

    let mut first = SoapMessage::new();
    serialize_header(&header, None, &mut first).unwrap();
    let first_xml = first.to_xml_string().unwrap();

    let reparsed = SoapMessage::parse(&first_xml).unwrap();
    let parsed = deserialize_header(reparsed.header(), IdentifierMode::Strict).unwrap();
    assert_eq!(parsed.consumer, header.consumer);
    assert_eq!(parsed.producer, header.producer);
    assert_eq!(parsed.user_id.as_deref(), Some("EE1234567890"));
    assert_eq!(parsed.security_token.as_deref(), Some("jwt-token"));
    assert_eq!(parsed.security_token_type.as_deref(), Some("urn:ee:x-road:jwt"));
    assert_eq!(parsed.protocol_version, "4.0");

    let mut second = SoapMessage::new();
    serialize_header(&parsed, None, &mut second).unwrap();
    assert_eq!(first_xml, second.to_xml_string().unwrap());
}

#[test]
fn test_header_element_order() {
    let header = MessageHeader::new(consumer(), producer(false), "ID-1")
        .unwrap()
        .with_user_id("user")
        .with_issue("issue");
    let mut message = SoapMessage::new();
    serialize_header(&header, None, &mut message).unwrap();

    let names: Vec<&str> = message
        .header()
        .unwrap()
        .child_elements()
        .map(|element| element.name.as_str())
        .collect();
    assert_eq!(names, ["client", "service", "userId", "id", "issue", "protocolVersion"]);
}

// ============================================================================
// Request body codec
// ============================================================================

#[test]
fn test_request_body_with_wrappers() {
    let request = ServiceRequest::new(consumer(), producer(true), "ID-1")
        .unwrap()
        .with_data("1234".to_string());
    let message = data_request_serializer().serialize(&request).unwrap();
    assert_eq!(
        body_xml(&message),
        r#"<ts:getRandom xmlns:ts="http://test.x-road.fi/producer"><ts:request><ts:data>1234</ts:data></ts:request></ts:getRandom>"#
    );
}

#[test]
fn test_request_body_without_wrappers() {
    let mut request = ServiceRequest::new(consumer(), producer(true), "ID-1")
        .unwrap()
        .with_data("1234".to_string());
    request.policy.process_wrappers = false;
    let message = data_request_serializer().serialize(&request).unwrap();

    let service = message.body().child("getRandom").unwrap();
    assert!(service.child("request").is_none());
    assert_eq!(service.child("data").unwrap().namespace.as_deref(), Some(PRODUCER_NS));
}

#[test]
fn test_request_body_namespace_not_added() {
    let mut request = ServiceRequest::new(consumer(), producer(true), "ID-1")
        .unwrap()
        .with_data("1234".to_string());
    request.policy.add_ns_to_request = false;
    let message = data_request_serializer().serialize(&request).unwrap();
    assert_eq!(
        body_xml(&message),
        r#"<ts:getRandom xmlns:ts="http://test.x-road.fi/producer"><request><data>1234</data></request></ts:getRandom>"#
    );
}

#[test]
fn test_request_round_trip_through_deserializers() {
    let request = ServiceRequest::new(consumer(), producer(true), "ID-1")
        .unwrap()
        .with_data("1234".to_string());
    let xml = data_request_serializer().serialize(&request).unwrap().to_xml_string().unwrap();
    let inbound = SoapMessage::parse(&xml).unwrap();

    let mut parsed: ServiceRequest<String> = ServiceRequestDeserializer::default().deserialize(&inbound).unwrap();
    assert_eq!(parsed, request);

    let body = CustomRequestDeserializer::new(|node: Option<&Element>| {
        Ok(node.and_then(|n| n.child("data")).map(Element::text_content))
    });
    body.deserialize(&mut parsed, &inbound, PRODUCER_NS).unwrap();
    assert_eq!(parsed.request_data.as_deref(), Some("1234"));
    assert_eq!(parsed.producer().unwrap().namespace(), Some(PRODUCER_NS));
    assert_eq!(parsed.producer().unwrap().namespace_prefix.as_deref(), Some("ts"));
}

#[test]
fn test_allowed_methods_request() {
    let consumer = ConsumerMember::new("FI", "GOV", "MEMBER1").unwrap();
    let producer = ProducerMember::new("FI", "COM", "MEMBER2", META_SERVICE_ALLOWED_METHODS).unwrap();
    let xml = meta_service_request(consumer, producer, "ID-1")
        .unwrap()
        .to_xml_string()
        .unwrap();

    assert!(xml.contains(r#"<xrd:client id:objectType="MEMBER"><id:xRoadInstance>FI</id:xRoadInstance><id:memberClass>GOV</id:memberClass><id:memberCode>MEMBER1</id:memberCode></xrd:client>"#));
    assert!(xml.contains("<id:serviceCode>allowedMethods</id:serviceCode>"));
    assert!(xml.contains("<SOAP-ENV:Body><xrd:allowedMethods/></SOAP-ENV:Body>"));
}

#[test]
fn test_allowed_methods_central_service_request() {
    let consumer = ConsumerMember::new("FI", "GOV", "MEMBER1").unwrap();
    let producer = ProducerMember::central_service("FI", META_SERVICE_ALLOWED_METHODS).unwrap();
    let message = meta_service_request(consumer, producer, "ID-1").unwrap();
    let xml = message.to_xml_string().unwrap();

    assert!(xml.contains(r#"<xrd:service id:objectType="CENTRALSERVICE"><id:xRoadInstance>FI</id:xRoadInstance><id:serviceCode>allowedMethods</id:serviceCode></xrd:service>"#));
    assert!(!xml.contains("<id:memberClass>COM</id:memberClass>"));
    assert!(xml.contains("<SOAP-ENV:Body><xrd:allowedMethods/></SOAP-ENV:Body>"));

    let header = deserialize_header(message.header(), IdentifierMode::Strict).unwrap();
    let producer = header.producer.unwrap();
    assert!(producer.is_central_service());
    assert_eq!(producer.service_code, META_SERVICE_ALLOWED_METHODS);
}

// ============================================================================
// Response body codec
// ============================================================================

#[test]
fn test_response_exactly_one_body_shape() {
    let request = ServiceRequest::new(consumer(), producer(true), "ID-1")
        .unwrap()
        .with_data("1234".to_string());
    let inbound = data_request_serializer().serialize(&request).unwrap();

    let mut normal = ServiceResponse::for_request(&request).with_response_data("5".to_string());
    let message = data_response_serializer().serialize_reply(&mut normal, &request, &inbound);
    let body = body_xml(&message);
    assert!(body.contains("<ts:response><data>5</data></ts:response>"));
    assert!(!body.contains("faultcode"));

    let mut in_band: ServiceResponse<String, String> = ServiceResponse::for_request(&request);
    in_band.error_message = Some(ErrorMessage::non_technical("err.code", "Something went wrong"));
    let message = data_response_serializer().serialize_reply(&mut in_band, &request, &inbound);
    let body = body_xml(&message);
    assert!(body.contains("<faultcode>err.code</faultcode><faultstring>Something went wrong</faultstring>"));
    assert!(message.header().is_some());
    assert!(!body.contains("<data>"));

    let mut standard: ServiceResponse<String, String> = ServiceResponse::for_request(&request);
    standard.error_message = Some(ErrorMessage::standard(FAULT_CODE_SERVER, "boom", None, None));
    let message = data_response_serializer().serialize_reply(&mut standard, &request, &inbound);
    assert!(message.header().is_none());
    assert!(message.body().child("getRandomResponse").is_none());
    assert!(message.body().child("Fault").is_some());
}

#[test]
fn test_response_round_trip() {
    let request = ServiceRequest::new(consumer(), producer(true), "ID-1")
        .unwrap()
        .with_data("1234".to_string());
    let inbound = data_request_serializer().serialize(&request).unwrap();
    let mut response = ServiceResponse::for_request(&request).with_response_data("5".to_string());
    let xml = data_response_serializer()
        .serialize_reply(&mut response, &request, &inbound)
        .to_xml_string()
        .unwrap();

    let parsed = data_response_deserializer()
        .deserialize(&SoapMessage::parse(&xml).unwrap(), PRODUCER_NS, true)
        .unwrap();
    assert_eq!(parsed.request_data.as_deref(), Some("1234"));
    assert_eq!(parsed.response_data.as_deref(), Some("5"));
    assert!(parsed.error_message.is_none());
    assert_eq!(parsed.producer().unwrap().namespace(), Some(PRODUCER_NS));
    assert_eq!(parsed.consumer().unwrap().object_type, ObjectType::Subsystem);
}

#[test]
fn test_response_element_not_unique() {
    let request = ServiceRequest::new(consumer(), producer(true), "ID-1")
        .unwrap()
        .with_data("1234".to_string());
    let inbound = data_request_serializer().serialize(&request).unwrap();
    let mut response = ServiceResponse::for_request(&request).with_response_data("5".to_string());
    let mut message = data_response_serializer().serialize_reply(&mut response, &request, &inbound);
    let duplicate = message.body().child("getRandomResponse").unwrap().clone();
    message.body_mut().add_child(duplicate);

    let reparsed = SoapMessage::parse(&message.to_xml_string().unwrap()).unwrap();
    let err = data_response_deserializer()
        .deserialize(&reparsed, PRODUCER_NS, true)
        .unwrap_err();
    assert!(matches!(err, XRoadError::Protocol(_)));
}

#[test]
fn test_response_element_missing_falls_back_to_fault() {
    let xml = r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/" xmlns:id="http://x-road.eu/xsd/identifiers" xmlns:xrd="http://x-road.eu/xsd/xroad.xsd"><SOAP-ENV:Header><xrd:client id:objectType="MEMBER"><id:xRoadInstance>FI</id:xRoadInstance><id:memberClass>GOV</id:memberClass><id:memberCode>MEMBER1</id:memberCode></xrd:client><xrd:service id:objectType="SERVICE"><id:xRoadInstance>FI</id:xRoadInstance><id:memberClass>COM</id:memberClass><id:memberCode>MEMBER2</id:memberCode><id:serviceCode>getRandom</id:serviceCode></xrd:service><xrd:id>ID-1</xrd:id></SOAP-ENV:Header><SOAP-ENV:Body><SOAP-ENV:Fault><faultcode>Server.ClientProxy.LoggingFailed</faultcode><faultstring>Cannot time-stamp messages</faultstring><faultactor></faultactor><detail>TimestamperFailed</detail></SOAP-ENV:Fault></SOAP-ENV:Body></SOAP-ENV:Envelope>"#;
    let response = data_response_deserializer()
        .deserialize(&SoapMessage::parse(xml).unwrap(), ANY_NAMESPACE, true)
        .unwrap();

    let fault = response.error_message.unwrap();
    assert!(fault.is_standard());
    assert_eq!(fault.fault_code(), Some("Server.ClientProxy.LoggingFailed"));
    assert_eq!(fault.fault_string(), Some("Cannot time-stamp messages"));
    assert_eq!(fault.fault_actor(), Some(""));
    assert_eq!(fault.detail(), Some("TimestamperFailed"));
    assert!(response.response_data.is_none());
}

// ============================================================================
// Adapter pipeline
// ============================================================================

#[test]
fn test_hello_service_wrappers() {
    let config = AdapterConfig {
        wrappers: WrapperPolicy {
            process_wrappers: true,
            ..WrapperPolicy::plain()
        },
        ..Default::default()
    };
    let adapter = Adapter::new(config).with_service("helloService", hello_service());
    let outbound = adapter.process(hello_request(HELLO_CLIENT, HELLO_BODY).as_bytes(), Some("text/xml"));

    let message = SoapMessage::parse(&outbound.body).unwrap();
    assert_eq!(
        body_xml(&message),
        "<helloServiceResponse><request><data>name=Alice</data></request><response><message>Hello Alice!</message></response></helloServiceResponse>"
    );
    let header = deserialize_header(message.header(), IdentifierMode::Strict).unwrap();
    assert_eq!(header.id.as_deref(), Some("ID-42"));
    assert_eq!(header.consumer.unwrap().to_string(), "FI.GOV.MEMBER1");
}

#[test]
fn test_missing_client_returns_client_fault() {
    let adapter = Adapter::new(AdapterConfig::default()).with_service("helloService", hello_service());
    let outbound = adapter.process(hello_request("", HELLO_BODY).as_bytes(), Some("text/xml"));

    let fault = fault_of(&outbound.body);
    assert_eq!(fault.child("faultcode").unwrap().text_content(), FAULT_CODE_CLIENT);
    assert_eq!(
        fault.child("faultstring").unwrap().text_content(),
        "Invalid X-Road SOAP message. Unable to parse the request."
    );
    assert_eq!(adapter.faults_returned(), 1);
}

#[test]
fn test_missing_namespace_returns_server_fault() {
    let adapter = Adapter::new(AdapterConfig::default()).with_service("helloService", hello_service());
    let outbound = adapter.process(hello_request(HELLO_CLIENT, HELLO_BODY).as_bytes(), Some("text/xml"));

    let fault = fault_of(&outbound.body);
    assert_eq!(fault.child("faultcode").unwrap().text_content(), FAULT_CODE_SERVER);
    assert_eq!(fault.child("faultstring").unwrap().text_content(), "Internal server error.");
    assert!(fault.child("faultactor").is_some());
    assert!(fault.child("detail").is_some());
}

#[test]
fn test_adapter_from_yaml_config() {
    let config = AdapterConfig::from_yaml_str(
        r#"
producer:
  namespace_url: "http://test.x-road.fi/producer"
  namespace_prefix: ts
wrappers:
  force_ns_on_children: true
"#,
    )
    .unwrap();
    let adapter = Adapter::new(config).with_service("helloService", hello_service());
    let body = format!(
        r#"<ts:helloService xmlns:ts="{}"><ts:request><ts:data>name=Bob</ts:data></ts:request></ts:helloService>"#,
        PRODUCER_NS
    );
    let outbound = adapter.process(hello_request(HELLO_CLIENT, &body).as_bytes(), Some("text/xml; charset=UTF-8"));

    let message = SoapMessage::parse(&outbound.body).unwrap();
    let response = message.body().child("helloServiceResponse").unwrap();
    assert_eq!(response.namespace.as_deref(), Some(PRODUCER_NS));
    let greeting = response.child("response").unwrap().child("message").unwrap();
    assert_eq!(greeting.namespace.as_deref(), Some(PRODUCER_NS));
    assert_eq!(greeting.text_content(), "Hello Bob!");
}
