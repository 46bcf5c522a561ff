//! 基础设施层：浏览器连接、页面操作与 JS 执行

pub mod browser_pool;
pub mod chrome_page;
pub mod dom;
/// 测试替身，不属于公开接口
#[doc(hidden)]
pub mod fake_page;
pub mod js_executor;

pub use browser_pool::ChromeBrowserPool;
pub use chrome_page::ChromePage;
pub use dom::{BrowserProvider, ConsoleEntry, ControlKind, FormControl, FormPage, QuestionBlock, SelectOption};
#[doc(hidden)]
pub use fake_page::{FakeBrowser, FakePage, PageChange};
pub use js_executor::JsExecutor;
