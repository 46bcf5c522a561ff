pub mod logging;
pub mod url;

pub use self::logging::truncate_text;
pub use self::url::{detect_site_type, normalize_url, registrable_domain};
