use std::io::Cursor;
use std::sync::Arc;

use odata_edm::{EdmComplexType, EdmEntityType, EdmModel, EdmNavigationProperty, EdmOperation, EdmPrimitiveKind, EdmType};
use odata_reader::collect::{self, ExpandedItem, ReadParameterValue};
use odata_reader::{
    ErrorKind, ODataCollectionReaderState, ODataItem, ODataMessage, ODataMessageReader,
    ODataParameterReaderState, ODataPrimitiveValue, ODataReaderError, ODataReaderSettings,
    ODataReaderState, ODataResourceReader, ODataValue, ReaderMetadata,
};

type Message = ODataMessage<Cursor<Vec<u8>>>;

fn response(body: &str) -> Message {
    ODataMessage::response(200, Cursor::new(body.as_bytes().to_vec()))
        .with_content_type("application/json")
}

/// Int64 and Decimal values may arrive as JSON strings.
fn ieee754_response(body: &str) -> Message {
    ODataMessage::response(200, Cursor::new(body.as_bytes().to_vec()))
        .with_content_type("application/json;IEEE754Compatible=true")
}

fn request(body: &str) -> Message {
    ODataMessage::request("POST", "http://host/Customers", Cursor::new(body.as_bytes().to_vec()))
        .with_content_type("application/json")
}

fn model() -> Arc<EdmModel> {
    let mut model = EdmModel::new();
    model
        .add_complex_type(EdmComplexType::new("NS.Address").property("City", EdmPrimitiveKind::String.into()))
        .unwrap()
        .add_entity_type(
            EdmEntityType::new("NS.Order")
                .with_key(&["Id"])
                .property("Id", EdmPrimitiveKind::Int32.into())
                .property("Total", EdmPrimitiveKind::Decimal.into()),
        )
        .unwrap()
        .add_entity_type(
            EdmEntityType::new("NS.Customer")
                .with_key(&["Id"])
                .property("Id", EdmPrimitiveKind::Int32.into())
                .property("Name", EdmPrimitiveKind::String.into())
                .property("Address", EdmType::Complex("NS.Address".into()))
                .property("Photo", EdmPrimitiveKind::Stream.into())
                .navigation(EdmNavigationProperty::many("Orders", "NS.Order"))
                .navigation(EdmNavigationProperty::single("BestFriend", "NS.Customer")),
        )
        .unwrap()
        .add_entity_set("Customers", "NS.Customer")
        .unwrap()
        .add_entity_set("Orders", "NS.Order")
        .unwrap()
        .add_operation(EdmOperation::action("NS.Rate").bound())
        .unwrap()
        .add_operation(EdmOperation::function("NS.TopOrders").bound())
        .unwrap()
        .add_operation(
            EdmOperation::action("NS.Discount")
                .parameter("percent", EdmPrimitiveKind::Int32.into())
                .parameter("order", EdmType::Entity("NS.Order".into()))
                .parameter("tags", EdmType::collection(EdmPrimitiveKind::String.into())),
        )
        .unwrap()
        .add_operation_import("Discount", "NS.Discount")
        .unwrap();
    Arc::new(model)
}

fn drain(reader: &mut ODataResourceReader) -> Vec<ODataReaderState> {
    let mut states = Vec::new();
    while reader.read().unwrap() {
        states.push(reader.state());
    }
    states
}

#[test]
fn deferred_navigation_link_matrix() {
    use ODataReaderState::*;
    let mut message_reader = ODataMessageReader::new(
        response(r#"{"Id":1,"Orders@odata.navigationLink":"http://host/Customers(1)/Orders"}"#),
        ODataReaderSettings::default(),
        None,
    );
    let mut reader = message_reader.create_resource_reader(ReaderMetadata::new()).unwrap();
    assert_eq!(reader.state(), Start);

    assert!(reader.read().unwrap());
    assert_eq!(reader.state(), ResourceStart);
    let resource = reader.item().and_then(ODataItem::as_resource).cloned().unwrap();
    assert_eq!(
        resource.property("Id").map(|p| &p.value),
        Some(&ODataValue::Primitive(ODataPrimitiveValue::Int32(1)))
    );

    assert!(reader.read().unwrap());
    assert_eq!(reader.state(), NestedResourceInfoStart);
    let info = reader.item().and_then(ODataItem::as_nested_resource_info).cloned().unwrap();
    assert_eq!(info.name, "Orders");
    assert_eq!(info.url.as_deref(), Some("http://host/Customers(1)/Orders"));

    assert!(reader.read().unwrap());
    assert_eq!(reader.state(), NestedResourceInfoEnd);
    assert!(reader.read().unwrap());
    assert_eq!(reader.state(), ResourceEnd);
    assert_eq!(reader.item().and_then(ODataItem::as_resource), Some(&resource));
    assert!(!reader.read().unwrap());
    assert_eq!(reader.state(), Completed);
}

#[test]
fn request_bind_links_yield_one_reference_link_each() {
    use ODataReaderState::*;
    let payload = r#"{"Id":1,"Orders@odata.bind":["http://host/Orders(1)","http://host/Orders(2)"]}"#;
    let mut message_reader = ODataMessageReader::new(request(payload), ODataReaderSettings::default(), None);
    let mut reader = message_reader.create_resource_reader(ReaderMetadata::new()).unwrap();

    let mut urls = Vec::new();
    let mut states = Vec::new();
    while reader.read().unwrap() {
        states.push(reader.state());
        if let Some(link) = reader.item().and_then(ODataItem::as_entity_reference_link) {
            urls.push(link.url.clone());
        }
    }
    assert_eq!(
        states,
        [
            ResourceStart,
            NestedResourceInfoStart,
            EntityReferenceLink,
            EntityReferenceLink,
            NestedResourceInfoEnd,
            ResourceEnd
        ]
    );
    assert_eq!(urls, ["http://host/Orders(1)", "http://host/Orders(2)"]);
}

#[test]
fn response_navigation_content_allows_one_item() {
    let payload = r#"{"Id":1,"Orders@odata.bind":["http://host/Orders(1)","http://host/Orders(2)"]}"#;
    let mut message_reader = ODataMessageReader::new(response(payload), ODataReaderSettings::default(), None);
    let mut reader = message_reader.create_resource_reader(ReaderMetadata::new()).unwrap();
    reader.read().unwrap();
    reader.read().unwrap();
    reader.read().unwrap();
    assert_eq!(reader.state(), ODataReaderState::EntityReferenceLink);

    let err = reader.read().unwrap_err();
    assert!(matches!(err, ODataReaderError::MultipleItemsInNavigationLinkContent));
    assert_eq!(
        err.to_string(),
        "each navigation link may contain at most one item in its content"
    );
    assert_eq!(reader.state(), ODataReaderState::Exception);
}

#[test]
fn nested_collection_type_is_rejected() {
    let nested = EdmType::collection(EdmType::collection(EdmPrimitiveKind::Int32.into()));
    let mut message_reader = ODataMessageReader::new(
        response(r#"{"value":[[1,2]]}"#),
        ODataReaderSettings::default(),
        None,
    );
    let mut reader = message_reader
        .create_collection_reader(ReaderMetadata::new().with_expected_type(nested))
        .unwrap();
    let err = reader.read().unwrap_err();
    assert!(matches!(
        err,
        ODataReaderError::NestedCollection { ref type_name } if type_name == "Collection(Collection(Edm.Int32))"
    ));
    assert_eq!(reader.state(), ODataCollectionReaderState::Exception);
}

#[test]
fn reads_after_completion_fail_without_moving() {
    let mut message_reader = ODataMessageReader::new(response(r#"{"Id":1}"#), ODataReaderSettings::default(), None);
    let mut reader = message_reader.create_resource_reader(ReaderMetadata::new()).unwrap();
    drain(&mut reader);
    assert_eq!(reader.state(), ODataReaderState::Completed);

    let first = reader.read().unwrap_err();
    let second = reader.read().unwrap_err();
    assert_eq!(first.kind(), ErrorKind::Usage);
    assert_eq!(second.kind(), ErrorKind::Usage);
    assert_eq!(first.to_string(), second.to_string());
    assert_eq!(reader.state(), ODataReaderState::Completed);
}

#[test]
fn expanded_navigation_collects_into_tree() {
    let payload = r#"{
        "Id":1,
        "Name":"Ana",
        "Orders@odata.count":2,
        "Orders":[{"Id":10,"Total":5.5},{"Id":11,"Total":"7"}],
        "BestFriend":null
    }"#;
    let mut message_reader = ODataMessageReader::new(ieee754_response(payload), ODataReaderSettings::default(), Some(model()));
    let mut reader = message_reader
        .create_resource_reader(ReaderMetadata::new().with_entity_set("Customers"))
        .unwrap();
    let tree = collect::read_resource(&mut reader).unwrap();

    assert_eq!(tree.resource.type_name.as_deref(), Some("NS.Customer"));
    assert_eq!(tree.nested.len(), 2);

    let orders = &tree.nested[0];
    assert_eq!(orders.info.name, "Orders");
    assert_eq!(orders.info.is_collection, Some(true));
    let [ExpandedItem::ResourceSet(set)] = orders.expanded_items.as_slice() else {
        panic!("expected one expanded set, got {:?}", orders.expanded_items);
    };
    assert_eq!(set.resources.len(), 2);
    assert_eq!(set.resources[0].resource.type_name.as_deref(), Some("NS.Order"));
    assert_eq!(
        set.resources[1].resource.property("Total").map(|p| &p.value),
        Some(&ODataValue::Primitive(ODataPrimitiveValue::Decimal("7".into())))
    );

    let friend = &tree.nested[1];
    assert_eq!(friend.info.is_collection, Some(false));
    assert_eq!(friend.expanded_items, [ExpandedItem::Resource(None)]);
}

#[test]
fn undeclared_property_on_closed_type() {
    let payload = r#"{"Id":1,"Extra":true}"#;
    let mut message_reader = ODataMessageReader::new(response(payload), ODataReaderSettings::default(), Some(model()));
    let mut reader = message_reader
        .create_resource_reader(ReaderMetadata::new().with_entity_set("Orders"))
        .unwrap();
    let err = reader.read().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    assert_eq!(
        err.to_string(),
        "the property 'Extra' is not declared on the non-open type 'NS.Order'"
    );

    let settings = ODataReaderSettings {
        allow_undeclared_properties: true,
        ..Default::default()
    };
    let mut message_reader = ODataMessageReader::new(response(payload), settings, Some(model()));
    let mut reader = message_reader
        .create_resource_reader(ReaderMetadata::new().with_entity_set("Orders"))
        .unwrap();
    let tree = collect::read_resource(&mut reader).unwrap();
    assert_eq!(
        tree.resource.property("Extra").map(|p| &p.value),
        Some(&ODataValue::Primitive(ODataPrimitiveValue::Boolean(true)))
    );
}

#[test]
fn declared_type_mismatch_message() {
    let mut message_reader = ODataMessageReader::new(response(r#"{"Id":"abc"}"#), ODataReaderSettings::default(), Some(model()));
    let mut reader = message_reader
        .create_resource_reader(ReaderMetadata::new().with_entity_set("Orders"))
        .unwrap();
    let err = reader.read().unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cannot convert the literal 'abc' to the expected type 'Edm.Int32'."
    );
    assert_eq!(reader.state(), ODataReaderState::Exception);
}

#[test]
fn operations_streams_and_association_links() {
    let payload = r##"{
        "#NS.Rate":{"title":"Rate","target":"http://host/Customers(1)/NS.Rate"},
        "#NS.TopOrders":[{"target":"http://host/Customers(1)/NS.TopOrders"}],
        "Id":1,
        "Photo@odata.mediaReadLink":"http://host/Customers(1)/Photo",
        "Photo@odata.mediaContentType":"image/png",
        "BestFriend@odata.associationLink":"http://host/Customers(1)/BestFriend/$ref"
    }"##;
    let mut message_reader = ODataMessageReader::new(response(payload), ODataReaderSettings::default(), Some(model()));
    let mut reader = message_reader
        .create_resource_reader(ReaderMetadata::new().with_entity_set("Customers"))
        .unwrap();
    let tree = collect::read_resource(&mut reader).unwrap();
    let resource = &tree.resource;

    assert_eq!(resource.actions.len(), 1);
    assert_eq!(resource.actions[0].metadata, "#NS.Rate");
    assert_eq!(resource.actions[0].title.as_deref(), Some("Rate"));
    assert_eq!(resource.functions.len(), 1);
    assert_eq!(
        resource.functions[0].target.as_deref(),
        Some("http://host/Customers(1)/NS.TopOrders")
    );

    let Some(ODataValue::StreamReference(photo)) = resource.property("Photo").map(|p| &p.value) else {
        panic!("Photo should be a stream reference");
    };
    assert_eq!(photo.read_link.as_deref(), Some("http://host/Customers(1)/Photo"));
    assert_eq!(photo.content_type.as_deref(), Some("image/png"));

    assert!(tree.nested.is_empty());
    assert_eq!(resource.association_links.len(), 1);
    assert_eq!(resource.association_links[0].name, "BestFriend");
}

#[test]
fn payload_order_is_recorded_when_enabled() {
    let payload = r##"{
        "@odata.id":"http://host/Customers(1)",
        "Id":1,
        "#NS.Rate":{},
        "Orders@odata.navigationLink":"http://host/Customers(1)/Orders",
        "Name":"Ana"
    }"##;
    let settings = ODataReaderSettings {
        record_payload_order: true,
        ..Default::default()
    };
    let mut message_reader = ODataMessageReader::new(response(payload), settings, Some(model()));
    let mut reader = message_reader
        .create_resource_reader(ReaderMetadata::new().with_entity_set("Customers"))
        .unwrap();
    let tree = collect::read_resource(&mut reader).unwrap();
    assert_eq!(
        tree.resource.payload_order.as_deref(),
        Some(
            &[
                "odata.id".to_string(),
                "Property:Id".to_string(),
                "Operation:#NS.Rate".to_string(),
                "NavigationLink:Orders".to_string(),
                "Property:Name".to_string(),
            ][..]
        )
    );
    assert_eq!(tree.resource.id.as_deref(), Some("http://host/Customers(1)"));
}

#[test]
fn duplicate_properties_replace_in_first_position() {
    let payload = r#"{"A":1,"B":2,"A":3}"#;
    let mut message_reader = ODataMessageReader::new(response(payload), ODataReaderSettings::default(), None);
    let mut reader = message_reader.create_resource_reader(ReaderMetadata::new()).unwrap();
    let err = reader.read().unwrap_err();
    assert!(matches!(err, ODataReaderError::DuplicateProperty { ref name } if name == "A"));

    let settings = ODataReaderSettings::from_toml_str("allow_duplicate_property_names = true").unwrap();
    let mut message_reader = ODataMessageReader::new(response(payload), settings, None);
    let mut reader = message_reader.create_resource_reader(ReaderMetadata::new()).unwrap();
    let tree = collect::read_resource(&mut reader).unwrap();
    let names: Vec<_> = tree.resource.properties.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["A", "B"]);
    assert_eq!(
        tree.resource.properties[0].value,
        ODataValue::Primitive(ODataPrimitiveValue::Int32(3))
    );
}

#[test]
fn parameter_reader_requires_nested_readers_to_drain() {
    let payload = r#"{"percent":10,"order":{"Id":1,"Total":2},"tags":["a","b"]}"#;
    let mut message_reader = ODataMessageReader::new(request(payload), ODataReaderSettings::default(), Some(model()));
    let mut reader = message_reader
        .create_parameter_reader(ReaderMetadata::new().with_operation_import("Discount"))
        .unwrap();

    assert!(reader.read().unwrap());
    assert_eq!(reader.state(), ODataParameterReaderState::Value);
    assert_eq!(reader.name(), Some("percent"));
    assert_eq!(
        reader.value(),
        Some(&ODataValue::Primitive(ODataPrimitiveValue::Int32(10)))
    );

    assert!(reader.read().unwrap());
    assert_eq!(reader.state(), ODataParameterReaderState::Resource);
    let err = reader.read().unwrap_err();
    assert!(matches!(err, ODataReaderError::NestedReaderNotDrained("resource")));
    assert_eq!(reader.state(), ODataParameterReaderState::Resource);

    let mut nested = reader.create_resource_reader().unwrap();
    let order = collect::read_resource(&mut nested).unwrap();
    assert_eq!(order.resource.type_name.as_deref(), Some("NS.Order"));

    assert!(reader.read().unwrap());
    assert_eq!(reader.state(), ODataParameterReaderState::Collection);
    let mut tags = reader.create_collection_reader().unwrap();
    let tags = collect::read_collection(&mut tags).unwrap();
    assert_eq!(tags.start.name.as_deref(), Some("tags"));
    assert_eq!(tags.items, [ODataValue::from("a"), ODataValue::from("b")]);

    assert!(!reader.read().unwrap());
    assert_eq!(reader.state(), ODataParameterReaderState::Completed);
}

#[test]
fn parameters_collect_in_payload_order() {
    let payload = r#"{"tags":[],"percent":5}"#;
    let mut message_reader = ODataMessageReader::new(request(payload), ODataReaderSettings::default(), Some(model()));
    let mut reader = message_reader
        .create_parameter_reader(ReaderMetadata::new().with_operation_import("Discount"))
        .unwrap();
    let parameters = collect::read_parameters(&mut reader).unwrap();
    let names: Vec<_> = parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["tags", "percent"]);
    assert!(matches!(parameters[0].value, ReadParameterValue::Collection(ref c) if c.items.is_empty()));
    assert_eq!(parameters[1].value, ReadParameterValue::Value(ODataValue::from(5)));
}
