//! Ports - 外部コラボレーターとの境界
//!
//! - **Repository**: データ層（find_by_id / save / delete）
//! - **View**: 表示層（on_result / on_show_message）

pub mod repository;
pub mod view;

pub use self::repository::{Repository, SingleResult};
pub use self::view::View;
