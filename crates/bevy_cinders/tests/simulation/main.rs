
mod modifiers;
mod render_data;
mod spawn;
mod state_machine;
mod vertices;
