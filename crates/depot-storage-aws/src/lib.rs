//! AWS storage backend.
//!
//! Records live in a DynamoDB table (partition key `namespace`, sort key
//! `uuid`); binary files live in an S3 bucket keyed by namespace, storage
//! tier, and uuid. The adapter keeps the two services consistent so callers
//! see one `(namespace, uuid)` lifecycle.

mod client;
mod dynamo;
mod s3;

pub use client::AwsClient;
pub use dynamo::DynamoRecords;
pub use s3::S3Files;
