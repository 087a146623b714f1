// @generated
// This file is @generated by prost-build.
#[derive(Clone, Copy, PartialEq, Eq, Hash, ::prost::Message)]
pub struct Empty {}
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct PublishRequest {
    #[prost(string, tag = "1")]
    pub cache_name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub topic: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "3")]
    pub value: ::core::option::Option<TopicValue>,
}
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct SubscriptionRequest {
    #[prost(string, tag = "1")]
    pub cache_name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub topic: ::prost::alloc::string::String,
    /// Resume the subscription at this sequence number. 0 starts at the live tail.
    #[prost(uint64, tag = "3")]
    pub resume_at_topic_sequence_number: u64,
    #[prost(uint64, tag = "4")]
    pub sequence_page: u64,
}
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct SubscriptionItem {
    #[prost(oneof = "subscription_item::Kind", tags = "1, 2, 3")]
    pub kind: ::core::option::Option<subscription_item::Kind>,
}
/// Nested message and enum types in `SubscriptionItem`.
pub mod subscription_item {
    #[derive(Clone, PartialEq, Eq, Hash, ::prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        Item(super::TopicItem),
        #[prost(message, tag = "2")]
        Discontinuity(super::Discontinuity),
        #[prost(message, tag = "3")]
        Heartbeat(super::Heartbeat),
    }
}
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct TopicItem {
    #[prost(uint64, tag = "1")]
    pub topic_sequence_number: u64,
    #[prost(message, optional, tag = "2")]
    pub value: ::core::option::Option<TopicValue>,
    #[prost(string, tag = "3")]
    pub publisher_id: ::prost::alloc::string::String,
    #[prost(uint64, tag = "4")]
    pub sequence_page: u64,
}
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct TopicValue {
    #[prost(oneof = "topic_value::Kind", tags = "1, 2")]
    pub kind: ::core::option::Option<topic_value::Kind>,
}
/// Nested message and enum types in `TopicValue`.
pub mod topic_value {
    #[derive(Clone, PartialEq, Eq, Hash, ::prost::Oneof)]
    pub enum Kind {
        #[prost(string, tag = "1")]
        Text(::prost::alloc::string::String),
        #[prost(bytes, tag = "2")]
        Binary(::prost::alloc::vec::Vec<u8>),
    }
}
#[derive(Clone, Copy, PartialEq, Eq, Hash, ::prost::Message)]
pub struct Discontinuity {
    #[prost(uint64, tag = "1")]
    pub last_topic_sequence: u64,
    #[prost(uint64, tag = "2")]
    pub new_topic_sequence: u64,
    #[prost(uint64, tag = "3")]
    pub new_sequence_page: u64,
}
#[derive(Clone, Copy, PartialEq, Eq, Hash, ::prost::Message)]
pub struct Heartbeat {}
