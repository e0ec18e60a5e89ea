//! 发布工作流

pub mod publish_flow;

pub use publish_flow::PublishFlow;
