//! Serializers describe the semantic shape of the values flowing through a
//! pipeline. The translator threads one through every stage it emits so that
//! later operators know which fields exist and what they hold.


use crate::expression::Lambda;
use bson::Bson;
use std::collections::BTreeMap;

pub const ANONYMOUS_TYPE_NAME: &str = "<anonymous>";

#[derive(PartialEq, Debug, Clone)]
pub enum Serializer {
    Scalar(ScalarType),
    Document(DocumentSerializer),
    Array(Box<Serializer>),
    Nullable(Box<Serializer>),
    /// A non-document value stored under a single synthetic field.
    Wrapped(WrappedValueSerializer),
    /// The output of a grouping stage: the key under `_id` and the grouped
    /// elements under `_elements`.
    Grouping(GroupingSerializer),
    /// The server returns documents of the source shape and the projection
    /// is evaluated by the caller.
    ClientSideProjection(ClientSideProjectionSerializer),
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, PartialOrd, Ord)]
pub enum ScalarType {
    Any,
    Boolean,
    DateTime,
    Decimal128,
    Double,
    Int32,
    Int64,
    Null,
    ObjectId,
    RegularExpression,
    String,
}

#[derive(PartialEq, Debug, Clone)]
pub struct DocumentSerializer {
    pub type_name: String,
    pub members: Vec<MemberSerializer>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct MemberSerializer {
    pub member_name: String,
    pub element_name: String,
    pub serializer: Serializer,
}

#[derive(PartialEq, Debug, Clone)]
pub struct WrappedValueSerializer {
    pub field_name: String,
    pub value: Box<Serializer>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct GroupingSerializer {
    pub key: Box<Serializer>,
    pub element: Box<Serializer>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ClientSideProjectionSerializer {
    pub source: Box<Serializer>,
    pub projector: Lambda,
}

impl Serializer {
    pub fn wrapped(field_name: impl Into<String>, value: Serializer) -> Serializer {
        Serializer::Wrapped(WrappedValueSerializer {
            field_name: field_name.into(),
            value: Box::new(value),
        })
    }

    pub fn array_of(element: Serializer) -> Serializer {
        Serializer::Array(Box::new(element))
    }

    /// Builds the serializer of an anonymous document whose element names
    /// are its member names.
    pub fn anonymous(members: Vec<(String, Serializer)>) -> Serializer {
        Serializer::Document(DocumentSerializer {
            type_name: ANONYMOUS_TYPE_NAME.to_string(),
            members: members
                .into_iter()
                .map(|(name, serializer)| MemberSerializer {
                    member_name: name.clone(),
                    element_name: name,
                    serializer,
                })
                .collect(),
        })
    }

    /// Infers the serializer of a constant from its bson type.
    pub fn for_value(value: &Bson) -> Serializer {
        match value {
            Bson::Array(items) => Serializer::array_of(
                items
                    .first()
                    .map(Serializer::for_value)
                    .unwrap_or(Serializer::Scalar(ScalarType::Any)),
            ),
            Bson::Document(d) => Serializer::anonymous(
                d.iter()
                    .map(|(k, v)| (k.clone(), Serializer::for_value(v)))
                    .collect(),
            ),
            _ => Serializer::Scalar(ScalarType::of(value)),
        }
    }

    /// Returns the member with the given name, for document serializers.
    pub fn member(&self, member_name: &str) -> Option<&MemberSerializer> {
        match self {
            Serializer::Document(d) => d.members.iter().find(|m| m.member_name == member_name),
            Serializer::Nullable(s) => s.member(member_name),
            _ => None,
        }
    }

    /// Returns the serializer of the items, for serializers of enumerable
    /// values.
    pub fn item_serializer(&self) -> Option<&Serializer> {
        match self {
            Serializer::Array(item) => Some(item),
            Serializer::Grouping(g) => Some(&g.element),
            Serializer::Nullable(s) => s.item_serializer(),
            _ => None,
        }
    }

    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self {
            Serializer::Scalar(t) => Some(*t),
            Serializer::Nullable(s) => s.scalar_type(),
            _ => None,
        }
    }

    pub fn is_string(&self) -> bool {
        self.scalar_type() == Some(ScalarType::String)
    }

    pub fn is_boolean(&self) -> bool {
        self.scalar_type() == Some(ScalarType::Boolean)
    }

    pub fn is_document(&self) -> bool {
        match self {
            Serializer::Document(_) | Serializer::Grouping(_) => true,
            Serializer::Nullable(s) => s.is_document(),
            _ => false,
        }
    }
}

impl ScalarType {
    pub fn of(value: &Bson) -> ScalarType {
        match value {
            Bson::Boolean(_) => ScalarType::Boolean,
            Bson::DateTime(_) => ScalarType::DateTime,
            Bson::Decimal128(_) => ScalarType::Decimal128,
            Bson::Double(_) => ScalarType::Double,
            Bson::Int32(_) => ScalarType::Int32,
            Bson::Int64(_) => ScalarType::Int64,
            Bson::Null => ScalarType::Null,
            Bson::ObjectId(_) => ScalarType::ObjectId,
            Bson::RegularExpression(_) => ScalarType::RegularExpression,
            Bson::String(_) => ScalarType::String,
            _ => ScalarType::Any,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ScalarType::Decimal128 | ScalarType::Double | ScalarType::Int32 | ScalarType::Int64
        )
    }
}

/// DiscriminatorConvention describes how the concrete type of a polymorphic
/// document is stored.
#[derive(PartialEq, Debug, Clone)]
pub struct DiscriminatorConvention {
    pub element_name: String,
    pub discriminators: BTreeMap<String, Bson>,
}

impl Default for DiscriminatorConvention {
    fn default() -> Self {
        Self {
            element_name: "_t".to_string(),
            discriminators: BTreeMap::new(),
        }
    }
}

impl DiscriminatorConvention {
    pub fn with_discriminator(mut self, type_name: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.discriminators.insert(type_name.into(), value.into());
        self
    }

    pub fn discriminator(&self, type_name: &str) -> Option<&Bson> {
        self.discriminators.get(type_name)
    }

    /// Returns every type stored with the given discriminator value.
    pub fn types_for(&self, value: &Bson) -> Vec<&str> {
        self.discriminators
            .iter()
            .filter(|(_, v)| *v == value)
            .map(|(t, _)| t.as_str())
            .collect()
    }
}

/// SerializerRegistry resolves type names to serializers. It is only ever
/// read by the compiler, so implementations shared across threads need no
/// interior locking beyond what their own population requires.
pub trait SerializerRegistry: Send + Sync {
    fn get_serializer(&self, type_name: &str) -> Option<Serializer>;

    fn lookup_discriminator_convention(&self, type_name: &str) -> Option<DiscriminatorConvention>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemorySerializerRegistry {
    serializers: BTreeMap<String, Serializer>,
    conventions: BTreeMap<String, DiscriminatorConvention>,
}

impl InMemorySerializerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_serializer(mut self, type_name: impl Into<String>, serializer: Serializer) -> Self {
        self.serializers.insert(type_name.into(), serializer);
        self
    }

    /// Registers a document type whose element names equal its member names.
    pub fn with_document<S: Into<String>>(
        self,
        type_name: &str,
        members: impl IntoIterator<Item = (S, Serializer)>,
    ) -> Self {
        let serializer = Serializer::Document(DocumentSerializer {
            type_name: type_name.to_string(),
            members: members
                .into_iter()
                .map(|(name, serializer)| {
                    let name = name.into();
                    MemberSerializer {
                        member_name: name.clone(),
                        element_name: name,
                        serializer,
                    }
                })
                .collect(),
        });
        self.with_serializer(type_name, serializer)
    }

    pub fn with_discriminator_convention(
        mut self,
        type_name: impl Into<String>,
        convention: DiscriminatorConvention,
    ) -> Self {
        self.conventions.insert(type_name.into(), convention);
        self
    }
}

impl SerializerRegistry for InMemorySerializerRegistry {
    fn get_serializer(&self, type_name: &str) -> Option<Serializer> {
        self.serializers.get(type_name).cloned()
    }

    fn lookup_discriminator_convention(&self, type_name: &str) -> Option<DiscriminatorConvention> {
        self.conventions.get(type_name).cloned()
    }
}
