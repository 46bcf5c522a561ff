//! 流程层（Workflow）
//!
//! 定义"一个申请表单"的完整处理流程：
//! - `ApplyContext` - 一次投递需要的全部输入
//! - `FormFlow` - 由站点选择器表驱动的表单状态机
//! - `outcome` - 提交后的结果判定（纯函数）

pub mod apply_ctx;
pub mod form_flow;
pub mod outcome;

pub use apply_ctx::ApplyContext;
pub use form_flow::{unresolved_required, FieldWidget, FormFlow, SiteSelectors, StaticField};
pub use outcome::{detect_outcome, Outcome, OutcomeSignals};
