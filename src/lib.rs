//! # Auto Apply
//!
//! 一个从任务队列领取职位投递任务、驱动浏览器填写 ATS 申请表的工作进程
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Browser / Page），只暴露能力
//! - `FormPage` / `BrowserProvider` - 页面与浏览器的窄接口，真实实现基于 chromiumoxide
//! - `JsExecutor` - 唯一的 page owner，提供 eval() 能力
//! - `store/` - 持久化接口 `Persistence` 与内存实现
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心任务生命周期
//! - `RateLimiter` - 按域名限速
//! - `error_classifier` / `retry` - 错误分类与退避重试
//! - `field_mapper` - 表单标签到用户资料的映射
//! - `ArtifactCollector` - 截图、HTML、控制台日志
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个申请表单"的完整处理流程
//! - `adapters/` - Greenhouse / Lever / Ashby 的选择器表
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/worker` - 轮询循环
//! - `orchestrator/task_runner` - 领取、执行、落库
//! - `orchestrator/apply_orchestrator` - 单次投递的资源准备与释放
//!
//! ## 模块结构

pub mod adapters;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod store;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use adapters::{AdapterRegistry, SiteAdapter};
pub use config::Config;
pub use error::{codes, AppError, AppResult};
pub use infrastructure::{BrowserProvider, ChromeBrowserPool, FormPage};
pub use models::{ApplyResult, ApplyStatus, JobTarget, Profile, Resume, Task, TaskStatus};
pub use orchestrator::{ApplyOrchestrator, TaskRunner, Worker};
pub use services::RateLimiter;
pub use store::{MemoryStore, Persistence};
pub use workflow::{ApplyContext, FormFlow};
