use std::io::Cursor;
use std::sync::Arc;

use odata_edm::{EdmComplexType, EdmEntityType, EdmModel, EdmNavigationProperty, EdmOperation, EdmPrimitiveKind, EdmType};
use odata_payload::compare::compare;
use odata_payload::convert::{
    read_payload_element, ConvertError, ObjectModelToPayloadElement, PayloadElementToObjectModel,
};
use odata_payload::normalize::{BucketedPropertyOrder, FillTypeNames};
use odata_payload::visit_mut::{walk_complex_mut, walk_entity_mut, VisitorMut};
use odata_payload::{
    BatchPart, ChangesetItem, ComplexInstance, ElementType, EntityInstance,
    NavigationPropertyInstance, NavigationValue, PayloadElement, PrimitiveValue, PropertyInstance,
    PropertyValue,
};
use odata_reader::collect::{self, ReadBatchPart, ReadChangesetItem, ReadParameterValue, ReadPayload};
use odata_reader::{
    ErrorKind, ODataMessage, ODataMessageReader, ODataPayloadKind, ODataPrimitiveValue,
    ODataReaderError, ODataReaderSettings, ODataResourceMember, ReaderMetadata,
};

type Message = ODataMessage<Cursor<Vec<u8>>>;

fn response(body: &str) -> Message {
    ODataMessage::response(200, Cursor::new(body.as_bytes().to_vec()))
        .with_content_type("application/json")
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

fn customers() -> ReaderMetadata {
    ReaderMetadata::new().with_entity_set("Customers")
}

fn navigation<'a>(entity: &'a EntityInstance, name: &str) -> &'a NavigationPropertyInstance {
    match entity.find_property(name).map(|p| &p.value) {
        Some(PropertyValue::Navigation(nav)) => nav,
        other => panic!("{name} should be a navigation property, got {other:?}"),
    }
}

#[test]
fn expanded_response_round_trips_through_the_tree() {
    let payload = r#"{
        "Id":1,
        "Name":"Ana",
        "Orders":[{"Id":10,"Total":5.5},{"Id":11,"Total":7}],
        "BestFriend":null
    }"#;
    let model = model();
    let mut message_reader = ODataMessageReader::new(response(payload), ODataReaderSettings::default(), Some(model.clone()));
    let ReadPayload::Resource(original) =
        collect::read_payload(&mut message_reader, ODataPayloadKind::Resource, customers()).unwrap()
    else {
        panic!("expected a resource");
    };

    let tree = ObjectModelToPayloadElement::new(Some(model.as_ref()), true)
        .convert(&ReadPayload::Resource(original.clone()))
        .unwrap();
    let entity = tree.as_entity().unwrap();
    assert_eq!(entity.type_name.as_deref(), Some("NS.Customer"));
    assert_eq!(
        entity.annotations.model_type(),
        Some(&EdmType::Entity("NS.Customer".into()))
    );

    let Some(NavigationValue::Expanded(orders)) = &navigation(entity, "Orders").value else {
        panic!("Orders should be expanded");
    };
    assert_eq!(orders.items.len(), 1);
    assert_eq!(orders.items[0].element_type(), ElementType::EntitySetInstance);
    assert_eq!(orders.items[0].as_entity_set().unwrap().entities.len(), 2);

    let Some(NavigationValue::Expanded(friend)) = &navigation(entity, "BestFriend").value else {
        panic!("BestFriend should be expanded");
    };
    assert_eq!(friend.items, [PayloadElement::from(EntityInstance::null())]);

    let ReadPayload::Resource(back) = PayloadElementToObjectModel::new(true).convert(&tree).unwrap() else {
        panic!("expected a resource");
    };
    assert_eq!(back, original);
}

#[test]
fn request_reference_links_keep_their_cardinality() {
    let payload = r#"{"Id":1,"Orders@odata.bind":["http://host/Orders(1)","http://host/Orders(2)"]}"#;
    let mut message_reader = ODataMessageReader::new(request(payload), ODataReaderSettings::default(), None);
    let tree = read_payload_element(&mut message_reader, ODataPayloadKind::Resource, ReaderMetadata::new()).unwrap();

    let Some(NavigationValue::Expanded(orders)) = &navigation(tree.as_entity().unwrap(), "Orders").value else {
        panic!("Orders should carry reference links");
    };
    let urls: Vec<_> = orders
        .items
        .iter()
        .map(|item| match item {
            PayloadElement::DeferredLink(link) => link.url.as_str(),
            other => panic!("unexpected {:?}", other.element_type()),
        })
        .collect();
    assert_eq!(urls, ["http://host/Orders(1)", "http://host/Orders(2)"]);

    let ReadPayload::Resource(back) = PayloadElementToObjectModel::new(false).convert(&tree).unwrap() else {
        panic!("expected a resource");
    };
    assert_eq!(back.nested[0].expanded_items.len(), 2);

    let err = PayloadElementToObjectModel::new(true).convert(&tree).unwrap_err();
    assert_eq!(
        err.to_string(),
        "each navigation link may contain at most one item in its content"
    );
    let ConvertError::Reader(err) = err else {
        panic!("expected a reader error");
    };
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

#[test]
fn deferred_link_matches_a_hand_built_tree() {
    let mut message_reader = ODataMessageReader::new(
        response(r#"{"Id":1,"Orders@odata.navigationLink":"http://x/y"}"#),
        ODataReaderSettings::default(),
        None,
    );
    let actual = read_payload_element(&mut message_reader, ODataPayloadKind::Resource, ReaderMetadata::new()).unwrap();
    let expected = EntityInstance::new(None)
        .property(PropertyInstance::navigation("Orders", NavigationPropertyInstance::deferred("http://x/y")))
        .property(PropertyInstance::primitive("Id", 1));

    assert_eq!(compare(&expected.clone().into(), &actual, false), Ok(()));
    let err = compare(&expected.into(), &actual, true).unwrap_err();
    assert!(err.reason.starts_with("property order differs"));

    let PropertyValue::Primitive(id) = &actual.as_entity().unwrap().properties[0].value else {
        panic!("Id should come first");
    };
    assert_eq!(id, &PrimitiveValue::new(1).with_type_name("Edm.Int32"));
}

#[test]
fn navigation_links_keep_their_wire_position() {
    let mut message_reader = ODataMessageReader::new(
        response(r#"{"Id":1,"Nav@odata.navigationLink":"http://h/x","Name":"n"}"#),
        ODataReaderSettings::default(),
        None,
    );
    let tree = read_payload_element(&mut message_reader, ODataPayloadKind::Resource, ReaderMetadata::new()).unwrap();
    let names: Vec<_> = tree
        .as_entity()
        .unwrap()
        .properties
        .iter()
        .map(|p| p.name.as_str())
        .collect();
    assert_eq!(names, ["Id", "Nav", "Name"]);

    let expected = EntityInstance::new(None)
        .property(PropertyInstance::primitive("Id", 1))
        .property(PropertyInstance::navigation("Nav", NavigationPropertyInstance::deferred("http://h/x")))
        .property(PropertyInstance::primitive("Name", "n"));
    assert_eq!(compare(&expected.into(), &tree, true), Ok(()));

    let ReadPayload::Resource(back) = PayloadElementToObjectModel::new(true).convert(&tree).unwrap() else {
        panic!("expected a resource");
    };
    assert_eq!(
        back.resource.member_order,
        [
            ODataResourceMember::Property,
            ODataResourceMember::NestedResourceInfo,
            ODataResourceMember::Property,
        ]
    );
    let again = ObjectModelToPayloadElement::new(None, true)
        .convert(&ReadPayload::Resource(back))
        .unwrap();
    assert_eq!(compare(&tree, &again, true), Ok(()));
}

#[test]
fn streams_operations_and_association_links() {
    let payload = r##"{
        "#NS.Rate":{"title":"Rate","target":"http://host/Customers(1)/NS.Rate"},
        "#NS.TopOrders":[{"target":"http://host/Customers(1)/NS.TopOrders"}],
        "Id":1,
        "Photo@odata.mediaReadLink":"http://host/Customers(1)/Photo",
        "Photo@odata.mediaContentType":"image/png",
        "BestFriend@odata.associationLink":"http://host/Customers(1)/BestFriend/$ref"
    }"##;
    let mut message_reader = ODataMessageReader::new(response(payload), ODataReaderSettings::default(), Some(model()));
    let tree = read_payload_element(&mut message_reader, ODataPayloadKind::Resource, customers()).unwrap();
    let entity = tree.as_entity().unwrap();

    let actions: Vec<_> = entity.actions().map(|op| op.metadata.as_str()).collect();
    let functions: Vec<_> = entity.functions().map(|op| op.metadata.as_str()).collect();
    assert_eq!(actions, ["#NS.Rate"]);
    assert_eq!(functions, ["#NS.TopOrders"]);

    let PropertyValue::NamedStream(photo) = &entity.find_property("Photo").unwrap().value else {
        panic!("Photo should be a named stream");
    };
    assert_eq!(photo.source_link.as_deref(), Some("http://host/Customers(1)/Photo"));
    assert_eq!(photo.content_type.as_deref(), Some("image/png"));
    assert!(navigation(entity, "BestFriend").is_association_only());

    let ordered = BucketedPropertyOrder::normalize(tree.clone());
    let names: Vec<_> = ordered
        .as_entity()
        .unwrap()
        .properties
        .iter()
        .map(|p| p.name.as_str())
        .collect();
    assert_eq!(names, ["Photo", "Id", "BestFriend"]);
    assert_eq!(compare(&tree, &ordered, false), Ok(()));
}

struct StripTypeNames;

impl VisitorMut for StripTypeNames {
    fn visit_entity_mut(&mut self, entity: &mut EntityInstance) {
        entity.type_name = None;
        walk_entity_mut(self, entity);
    }

    fn visit_complex_mut(&mut self, complex: &mut ComplexInstance) {
        complex.type_name = None;
        walk_complex_mut(self, complex);
    }

    fn visit_primitive_mut(&mut self, value: &mut PrimitiveValue) {
        value.type_name = None;
    }
}

#[test]
fn model_annotations_restore_type_names() {
    let payload = r#"{"Id":1,"Address":{"City":"Oslo"}}"#;
    let mut message_reader = ODataMessageReader::new(response(payload), ODataReaderSettings::default(), Some(model()));
    let mut tree = read_payload_element(&mut message_reader, ODataPayloadKind::Resource, customers()).unwrap();
    StripTypeNames.visit_element_mut(&mut tree);

    let tree = FillTypeNames::normalize(tree);
    let entity = tree.as_entity().unwrap();
    assert_eq!(entity.type_name.as_deref(), Some("NS.Customer"));
    let PropertyValue::Primitive(id) = &entity.find_property("Id").unwrap().value else {
        panic!("Id should be primitive");
    };
    assert_eq!(id.type_name.as_deref(), Some("Edm.Int32"));
    let PropertyValue::Complex(address) = &entity.find_property("Address").unwrap().value else {
        panic!("Address should be complex");
    };
    assert_eq!(address.type_name.as_deref(), Some("NS.Address"));
    let PropertyValue::Primitive(city) = &address.find_property("City").unwrap().value else {
        panic!("City should be primitive");
    };
    assert_eq!(city.type_name.as_deref(), Some("Edm.String"));
}

#[test]
fn parameters_round_trip() {
    let payload = r#"{"percent":10,"order":{"Id":1,"Total":2},"tags":["a","b"]}"#;
    let mut message_reader = ODataMessageReader::new(request(payload), ODataReaderSettings::default(), Some(model()));
    let ReadPayload::Parameters(original) = collect::read_payload(
        &mut message_reader,
        ODataPayloadKind::Parameter,
        ReaderMetadata::new().with_operation_import("Discount"),
    )
    .unwrap() else {
        panic!("expected parameters");
    };
    assert!(matches!(original[2].value, ReadParameterValue::Collection(_)));

    let tree = ObjectModelToPayloadElement::new(None, false)
        .convert(&ReadPayload::Parameters(original.clone()))
        .unwrap();
    let PayloadElement::Parameters(parameters) = &tree else {
        panic!("expected a parameters payload");
    };
    let kinds: Vec<_> = parameters.parameters.iter().map(|p| p.value.element_type()).collect();
    assert_eq!(
        kinds,
        [
            ElementType::PrimitiveValue,
            ElementType::EntityInstance,
            ElementType::PrimitiveMultiValue
        ]
    );
    let PayloadElement::PrimitiveMultiValue(tags) = &parameters.parameters[2].value else {
        unreachable!()
    };
    assert_eq!(tags.annotations.collection_name(), Some("tags"));

    let ReadPayload::Parameters(back) = PayloadElementToObjectModel::new(false).convert(&tree).unwrap() else {
        panic!("expected parameters");
    };
    assert_eq!(back, original);
}

const BATCH: &str = "--batch_1\r\n\
Content-Type: application/http\r\n\
\r\n\
POST http://host/Customers HTTP/1.1\r\n\
Content-Type: application/json\r\n\
\r\n\
{\"Id\":\r\n\
--batch_1\r\n\
Content-Type: application/http\r\n\
\r\n\
POST http://host/Customers HTTP/1.1\r\n\
Content-Type: application/json\r\n\
\r\n\
{\"Id\":2}\r\n\
--batch_1--\r\n";

#[test]
fn batch_operations_convert_with_failed_bodies_left_empty() {
    let message = ODataMessage::request("POST", "http://host/$batch", Cursor::new(BATCH.as_bytes().to_vec()))
        .with_content_type("multipart/mixed; boundary=batch_1");
    let mut message_reader = ODataMessageReader::new(message, ODataReaderSettings::default(), None);
    let mut batch_reader = message_reader.create_batch_reader().unwrap();
    let batch = collect::read_batch(&mut batch_reader, |operation| {
        let mut body_reader = ODataMessageReader::new(operation, ODataReaderSettings::default(), None);
        collect::read_payload(&mut body_reader, ODataPayloadKind::Resource, ReaderMetadata::new())
            .map(Some)
    })
    .unwrap();

    let tree = ObjectModelToPayloadElement::new(None, false)
        .convert(&ReadPayload::Batch(batch))
        .unwrap();
    let PayloadElement::BatchRequest(batch) = &tree else {
        panic!("expected a request batch");
    };
    assert_eq!(batch.parts.len(), 2);
    let first = batch.parts[0].operations().next().unwrap();
    assert_eq!(first.method, "POST");
    assert_eq!(first.url, "http://host/Customers");
    assert!(first.payload.is_none());

    let second = batch.parts[1]
        .operations()
        .next()
        .unwrap()
        .payload
        .as_deref()
        .and_then(PayloadElement::as_entity)
        .unwrap();
    let PropertyValue::Primitive(id) = &second.find_property("Id").unwrap().value else {
        panic!("Id should be primitive");
    };
    assert_eq!(id.value, Some(ODataPrimitiveValue::Int32(2)));

    let ReadPayload::Batch(back) = PayloadElementToObjectModel::new(false).convert(&tree).unwrap() else {
        panic!("expected a batch");
    };
    assert!(!back.is_response);
    assert_eq!(back.operations().count(), 2);
}

const CHANGESET: &str = "--batch_1\r\n\
Content-Type: multipart/mixed; boundary=cs_1\r\n\
\r\n\
--cs_1\r\n\
Content-Type: application/http\r\n\
\r\n\
POST http://host/Customers HTTP/1.1\r\n\
Content-Type: application/json\r\n\
\r\n\
{\"Id\":1}\r\n\
--cs_1\r\n\
Content-Type: application/http\r\n\
\r\n\
NOT A REQUEST LINE\r\n\
\r\n\
--cs_1--\r\n\
--batch_1--\r\n";

#[test]
fn malformed_changeset_part_becomes_an_error_in_its_changeset() {
    let message = ODataMessage::request("POST", "http://host/$batch", Cursor::new(CHANGESET.as_bytes().to_vec()))
        .with_content_type("multipart/mixed; boundary=batch_1");
    let mut message_reader = ODataMessageReader::new(message, ODataReaderSettings::default(), None);
    let mut batch_reader = message_reader.create_batch_reader().unwrap();
    let batch = collect::read_batch(&mut batch_reader, |_| Ok(None)).unwrap();

    let tree = ObjectModelToPayloadElement::new(None, false)
        .convert(&ReadPayload::Batch(batch))
        .unwrap();
    let PayloadElement::BatchRequest(request) = &tree else {
        panic!("expected a request batch");
    };
    assert_eq!(request.parts.len(), 1);
    let BatchPart::Changeset(items) = &request.parts[0] else {
        panic!("expected a changeset");
    };
    assert_eq!(items.len(), 2);
    assert!(matches!(&items[0], ChangesetItem::Operation(op) if op.method == "POST"));
    let ChangesetItem::Failed(error) = &items[1] else {
        panic!("the malformed part should be an error entry");
    };
    let message = error.message.as_deref().unwrap();
    assert!(message.contains("invalid request line 'NOT A REQUEST LINE'"), "{message}");

    let ReadPayload::Batch(back) = PayloadElementToObjectModel::new(false).convert(&tree).unwrap() else {
        panic!("expected a batch");
    };
    let ReadBatchPart::Changeset(items) = &back.parts[0] else {
        panic!("expected a changeset");
    };
    assert!(matches!(&items[1], ReadChangesetItem::Failed(ODataReaderError::Batch(_))));
    assert_eq!(back.operations().count(), 1);

    let again = ObjectModelToPayloadElement::new(None, false)
        .convert(&ReadPayload::Batch(back))
        .unwrap();
    let PayloadElement::BatchRequest(again) = &again else {
        panic!("expected a request batch");
    };
    assert!(matches!(&again.parts[0], BatchPart::Changeset(items) if matches!(items[1], ChangesetItem::Failed(_))));
}
