//! View port - presenter が結果を表示する先

/// Display surface attached to a [`crate::presenter::SchedulerFacade`].
///
/// The facade only calls into a view while it is attached.
pub trait View: Send + Sync {
    type Model;

    fn on_result(&self, value: Self::Model);
    fn on_show_message(&self, message: &str);
}
