//! SeaORM entity models
//!
//! Database entities for Beacon

mod conversation;
mod message;
mod search_result;

pub use conversation::{
    ActiveModel as ConversationActiveModel, Column as ConversationColumn,
    Entity as ConversationEntity, Model as Conversation,
};

pub use message::{
    ActiveModel as MessageActiveModel, Column as MessageColumn, Entity as MessageEntity,
    Model as Message,
};

pub use search_result::{
    ActiveModel as SearchResultActiveModel, Column as SearchResultColumn,
    Entity as SearchResultEntity, Model as SearchResult,
};
