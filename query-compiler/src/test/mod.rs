
use crate::serializer::{
    DiscriminatorConvention, DocumentSerializer, InMemorySerializerRegistry, MemberSerializer,
    ScalarType, Serializer,
};
use bson::{doc, Document};

pub(crate) fn string() -> Serializer {
    Serializer::Scalar(ScalarType::String)
}

pub(crate) fn int() -> Serializer {
    Serializer::Scalar(ScalarType::Int32)
}

/// Orders have a customer letter `A`, a distinct amount `U`, a label `B`,
/// a list of items and a list of tags. Customers are keyed by the letter.
pub(crate) fn registry() -> InMemorySerializerRegistry {
    let item = Serializer::Document(DocumentSerializer {
        type_name: "Item".to_string(),
        members: vec![MemberSerializer {
            member_name: "P".to_string(),
            element_name: "P".to_string(),
            serializer: int(),
        }],
    });
    let animals = DiscriminatorConvention::default()
        .with_discriminator("Cat", "cat")
        .with_discriminator("Lion", "cat")
        .with_discriminator("Dog", "dog");
    InMemorySerializerRegistry::new()
        .with_document(
            "Order",
            vec![
                ("_id", int()),
                ("A", string()),
                ("U", int()),
                ("B", string()),
                ("Items", Serializer::array_of(item.clone())),
                ("Tags", Serializer::array_of(string())),
                ("Paid", Serializer::Scalar(ScalarType::Boolean)),
            ],
        )
        .with_serializer("Item", item)
        .with_document("Customer", vec![("A", string()), ("Name", string())])
        .with_document("Animal", vec![("Name", string())])
        .with_document("Cat", vec![("Name", string()), ("Lives", int())])
        .with_document("Dog", vec![("Name", string()), ("Breed", string())])
        .with_discriminator_convention("Cat", animals.clone())
        .with_discriminator_convention("Lion", animals.clone())
        .with_discriminator_convention("Dog", animals)
}

pub(crate) fn orders() -> Vec<Document> {
    (0..10)
        .map(|i: i32| {
            let items: Vec<Document> = (0..i % 3 + 1).map(|j| doc! {"P": i + j}).collect();
            doc! {
                "_id": i,
                "A": (["x", "y", "z"][(i % 3) as usize]),
                "U": (i * 7) % 11 + 1,
                "B": format!("b{i}"),
                "Items": items,
                "Tags": [format!("t{}", i % 2), "all"],
                "Paid": i % 4 == 0,
            }
        })
        .collect()
}
