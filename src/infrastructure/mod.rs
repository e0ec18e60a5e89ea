//! 基础设施层
//!
//! 持有稀缺资源（浏览器页面），只向上暴露能力：
//! - `Dom` - 页面操作能力（导航、等待、点击、输入、上传）
//! - `DomProvider` - 按需开启新页面的能力
//!
//! 所有外部等待都带有数值上限，超时返回带描述的错误，
//! 绝不允许第三方页面把工作流挂死。

pub mod dom;

#[cfg(test)]
pub mod fake_dom;

pub use dom::{CdpBrowser, CdpDom, Dom, DomProvider};
