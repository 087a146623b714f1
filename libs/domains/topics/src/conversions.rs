//! Proto ↔ domain conversions for topic messages

use protos::cache_client::pubsub::{
    self as pb, subscription_item, topic_value, PublishRequest, SubscriptionItem,
    SubscriptionRequest,
};

use crate::error::TopicError;
use crate::models::{SubscribeRequest, TopicDiscontinuity, TopicEvent, TopicItem, TopicValue};

impl From<TopicValue> for pb::TopicValue {
    fn from(value: TopicValue) -> Self {
        let kind = match value {
            TopicValue::Text(text) => topic_value::Kind::Text(text),
            TopicValue::Binary(bytes) => topic_value::Kind::Binary(bytes),
        };
        pb::TopicValue { kind: Some(kind) }
    }
}

impl TryFrom<pb::TopicValue> for TopicValue {
    type Error = TopicError;

    fn try_from(value: pb::TopicValue) -> Result<Self, Self::Error> {
        match value.kind {
            Some(topic_value::Kind::Text(text)) => Ok(TopicValue::Text(text)),
            Some(topic_value::Kind::Binary(bytes)) => Ok(TopicValue::Binary(bytes)),
            None => Err(TopicError::UnexpectedMessage(
                "topic value has no kind".to_string(),
            )),
        }
    }
}

impl TryFrom<pb::TopicItem> for TopicItem {
    type Error = TopicError;

    fn try_from(item: pb::TopicItem) -> Result<Self, Self::Error> {
        let value = item
            .value
            .ok_or_else(|| TopicError::UnexpectedMessage("topic item has no value".to_string()))?
            .try_into()?;
        Ok(TopicItem {
            value,
            sequence_number: item.topic_sequence_number,
            sequence_page: item.sequence_page,
            publisher_id: Some(item.publisher_id).filter(|id| !id.is_empty()),
        })
    }
}

impl From<pb::Discontinuity> for TopicDiscontinuity {
    fn from(discontinuity: pb::Discontinuity) -> Self {
        TopicDiscontinuity {
            last_sequence_number: discontinuity.last_topic_sequence,
            new_sequence_number: discontinuity.new_topic_sequence,
            new_sequence_page: discontinuity.new_sequence_page,
        }
    }
}

impl TryFrom<SubscriptionItem> for TopicEvent {
    type Error = TopicError;

    fn try_from(item: SubscriptionItem) -> Result<Self, Self::Error> {
        match item.kind {
            Some(subscription_item::Kind::Item(item)) => Ok(TopicEvent::Item(item.try_into()?)),
            Some(subscription_item::Kind::Discontinuity(discontinuity)) => {
                Ok(TopicEvent::Discontinuity(discontinuity.into()))
            }
            Some(subscription_item::Kind::Heartbeat(_)) => Ok(TopicEvent::Heartbeat),
            None => Err(TopicError::UnexpectedMessage(
                "subscription item has no kind".to_string(),
            )),
        }
    }
}

impl From<&SubscribeRequest> for SubscriptionRequest {
    fn from(request: &SubscribeRequest) -> Self {
        SubscriptionRequest {
            cache_name: request.cache_name.clone(),
            topic: request.topic.clone(),
            resume_at_topic_sequence_number: request.resume_at_sequence_number,
            sequence_page: request.sequence_page,
        }
    }
}

pub(crate) fn publish_request(cache_name: &str, topic: &str, value: TopicValue) -> PublishRequest {
    PublishRequest {
        cache_name: cache_name.to_string(),
        topic: topic.to_string(),
        value: Some(value.into()),
    }
}
