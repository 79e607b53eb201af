mod articles;
mod categories;
mod feeds;
mod jobs;
mod schema;
mod types;
mod users;

pub use schema::Database;
pub use types::{
    Article, Category, DatabaseError, Feed, FeedSubscription, Job, JobEvent, JobEventType,
    JobProgress, JobType, NewArticle, NewCategory, NewFeed, NewSubscription, ParsedArticle, User,
    UserArticle,
};
