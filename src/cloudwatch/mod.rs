//! CloudWatch metric source
//!
//! Built on `aws-sdk-cloudwatch`. Region comes from the `[source]` table;
//! credentials come from the default provider chain (environment, shared
//! profile, SSO, ECS/EC2 instance roles).

pub mod client;

pub use client::CloudWatchClient;
