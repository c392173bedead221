pub mod chat_widget;
pub mod course_generation_button;
pub mod course_generation_modal;
