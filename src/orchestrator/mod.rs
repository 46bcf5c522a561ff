//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责任务调度和资源生命周期，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `worker` - 工作进程主循环
//! - 轮询队列，一次只处理一个任务
//! - 响应停止信号，退出时关闭浏览器并输出统计
//!
//! ### `task_runner` - 任务执行器
//! - 原子领取任务（queued → running）
//! - 加载职位、简历、资料
//! - 把投递结果落库为任务 / 职位状态，写审计事件
//!
//! ### `apply_orchestrator` - 投递编排器
//! - 解析适配器、限速、下载简历、获取页面、导航、预检
//! - 保存产物，保证页面和临时文件被释放
//!
//! ## 层次关系
//!
//! ```text
//! worker (轮询循环)
//!     ↓
//! task_runner (处理单个 Task)
//!     ↓
//! apply_orchestrator (资源准备与释放)
//!     ↓
//! adapters → workflow::FormFlow (填表与提交)
//!     ↓
//! services (限速 / 分类 / 重试 / 字段映射 / 产物)
//!     ↓
//! infrastructure (FormPage / BrowserProvider)
//! ```

pub mod apply_orchestrator;
pub mod task_runner;
pub mod worker;

// 重新导出主要类型
pub use apply_orchestrator::{ApplyOrchestrator, ApplyOutcome, ApplyRequest};
pub use task_runner::{RunReport, TaskRunner};
pub use worker::Worker;
