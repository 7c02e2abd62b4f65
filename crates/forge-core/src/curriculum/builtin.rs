//! Default curriculum: a single chain from UI basics to research-grade work.

use super::TaskDefinition;
use crate::types::Difficulty;

pub fn builtin_tasks() -> Vec<TaskDefinition> {
    vec![
        TaskDefinition::new("simple_button", "ui_components", Difficulty::Beginner)
            .with_description("Create a simple button with hover effects")
            .with_estimated_minutes(5),
        TaskDefinition::new("basic_form", "ui_components", Difficulty::Beginner)
            .with_description("Create a contact form with validation")
            .with_prerequisites(&["simple_button"])
            .with_estimated_minutes(10),
        TaskDefinition::new("todo_list", "interactive_apps", Difficulty::Intermediate)
            .with_description("Build a todo list with add/remove functionality")
            .with_prerequisites(&["basic_form"])
            .with_estimated_minutes(15),
        TaskDefinition::new("data_table", "data_visualization", Difficulty::Intermediate)
            .with_description("Create a sortable, filterable data table")
            .with_prerequisites(&["todo_list"])
            .with_estimated_minutes(20),
        TaskDefinition::new("chart_dashboard", "data_visualization", Difficulty::Advanced)
            .with_description("Build a dashboard with interactive charts")
            .with_prerequisites(&["data_table"])
            .with_estimated_minutes(30),
        TaskDefinition::new("real_time_chat", "full_stack", Difficulty::Advanced)
            .with_description("Create a real-time chat application")
            .with_prerequisites(&["chart_dashboard"])
            .with_estimated_minutes(45),
        TaskDefinition::new("game_engine", "algorithms", Difficulty::Expert)
            .with_description("Build a simple 2D game engine with physics")
            .with_prerequisites(&["real_time_chat"])
            .with_estimated_minutes(60),
        TaskDefinition::new("ai_code_assistant", "research", Difficulty::Research)
            .with_description("Create an AI-powered code completion tool")
            .with_prerequisites(&["game_engine"])
            .with_estimated_minutes(90),
    ]
}
