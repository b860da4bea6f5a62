use odata_payload::normalize::{AssociationLinksLast, BucketedPropertyOrder, DeduplicateProperties};
use odata_payload::{
    EntityInstance, NamedStreamInstance, NavigationPropertyInstance, PayloadElement,
    PropertyInstance, PropertyValue,
};
use proptest::prelude::*;

fn property() -> impl Strategy<Value = PropertyInstance> {
    (0..4u8, "[A-D]", any::<i32>()).prop_map(|(kind, name, n)| match kind {
        0 => PropertyInstance::primitive(name, n),
        1 => PropertyInstance::named_stream(name, NamedStreamInstance::default()),
        2 => PropertyInstance::navigation(name, NavigationPropertyInstance::deferred(n.to_string())),
        _ => PropertyInstance::navigation(
            name,
            NavigationPropertyInstance::association_only(format!("{n}/$ref")),
        ),
    })
}

fn entity() -> impl Strategy<Value = EntityInstance> {
    prop::collection::vec(property(), 0..12).prop_map(|properties| EntityInstance {
        properties,
        ..Default::default()
    })
}

fn rank(property: &PropertyInstance) -> u8 {
    match &property.value {
        PropertyValue::Navigation(n) if n.is_association_only() => 3,
        PropertyValue::Navigation(_) => 0,
        PropertyValue::NamedStream(_) => 1,
        _ => 2,
    }
}

fn properties(root: &PayloadElement) -> &[PropertyInstance] {
    &root.as_entity().unwrap().properties
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn bucketed_order_is_idempotent(e in entity()) {
        let once = BucketedPropertyOrder::normalize(e.into());
        let twice = BucketedPropertyOrder::normalize(once.clone());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn bucketed_order_sorts_stably(e in entity()) {
        let original = e.properties.clone();
        let root = BucketedPropertyOrder::normalize(e.into());
        let ranks: Vec<u8> = properties(&root).iter().map(rank).collect();
        prop_assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
        for bucket in 0..4u8 {
            let before: Vec<_> = original.iter().filter(|p| rank(p) == bucket).collect();
            let after: Vec<_> = properties(&root).iter().filter(|p| rank(p) == bucket).collect();
            prop_assert_eq!(before, after);
        }
    }

    #[test]
    fn association_links_last_is_idempotent(e in entity()) {
        let once = AssociationLinksLast::normalize(e.into());
        let twice = AssociationLinksLast::normalize(once.clone());
        let tail_started = properties(&once)
            .iter()
            .position(PropertyInstance::is_association_only)
            .unwrap_or(properties(&once).len());
        prop_assert!(properties(&once)[tail_started..].iter().all(PropertyInstance::is_association_only));
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn dedupe_keeps_last_value_in_first_position(e in entity()) {
        let mut first_seen: Vec<&str> = Vec::new();
        for p in &e.properties {
            if !first_seen.contains(&p.name.as_str()) {
                first_seen.push(&p.name);
            }
        }
        let root = DeduplicateProperties::normalize(e.clone().into());
        let names: Vec<&str> = properties(&root).iter().map(|p| p.name.as_str()).collect();
        prop_assert_eq!(&names, &first_seen);
        for survivor in properties(&root) {
            let last = e.properties.iter().rev().find(|p| p.name == survivor.name).unwrap();
            prop_assert_eq!(survivor, last);
        }
    }
}
