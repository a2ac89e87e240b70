//! Guard and tool-loop scenarios driven by a scripted model.

mod api_guard;
mod tool_loop;
