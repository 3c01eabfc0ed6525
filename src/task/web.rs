use askama::Template;
use axum::{
    Form, Router,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::Html,
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::CurrentUser;
use crate::task::{STATUS_OPEN, Task, TaskService, TaskServiceError};

#[derive(Debug, Deserialize)]
pub struct AddTaskForm {
    name: String,
    due_date: String,
    priority: i32,
    #[serde(default)]
    posted_date: Option<String>,
    #[serde(default)]
    status: Option<i32>,
}

/// Custom error type for task handler operations.
#[derive(Debug, thiserror::Error)]
enum TaskError {
    /// Represents an error during template rendering.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    /// Represents a task service error.
    #[error("Task service error")]
    Service(#[from] TaskServiceError),
}

impl axum::response::IntoResponse for TaskError {
    fn into_response(self) -> axum::response::Response {
        let user_facing_error_message =
            "An unexpected error occurred while processing your request. Please try again later.";
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!(
                "<h1>Internal Server Error</h1><p>{}</p>",
                user_facing_error_message
            )),
        )
            .into_response()
    }
}

#[derive(Template)]
#[template(path = "tasks.html")]
struct TasksTemplate<'a> {
    name: &'a str,
    open_tasks: Vec<Task>,
    closed_tasks: Vec<Task>,
    message: Option<String>,
}

#[derive(Clone, Debug)]
pub struct TaskState {
    pub db: Arc<sea_orm::DatabaseConnection>,
}

/// Helper function that fetches the current user's open and closed
/// tasks and renders the task list page, with an optional notice at the
/// top. Every task handler responds with this page.
#[tracing::instrument(skip(task_service))]
async fn render_task_list(
    task_service: &TaskService<'_>,
    user: &CurrentUser,
    message: Option<String>,
) -> Result<String, TaskError> {
    let open_tasks = task_service.open_tasks(user.id).await?;
    let closed_tasks = task_service.closed_tasks(user.id).await?;
    let template = TasksTemplate {
        name: &user.name,
        open_tasks,
        closed_tasks,
        message,
    };
    template.render().map_err(TaskError::from)
}

/// Handler for the task list page.
#[tracing::instrument(skip(state))]
async fn tasks_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Html<String>, TaskError> {
    let task_service = TaskService::new(&state.db);
    let html = render_task_list(&task_service, &user, None).await?;
    Ok(Html(html))
}

/// Handler for creating a new task via POST request.
#[tracing::instrument(skip(state, form))]
async fn add_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Form(form): Form<AddTaskForm>,
) -> Result<Html<String>, TaskError> {
    let task_service = TaskService::new(&state.db);

    if form.name.trim().is_empty() || form.due_date.trim().is_empty() {
        let html = render_task_list(
            &task_service,
            &user,
            Some("All fields are required.".to_string()),
        )
        .await?;
        return Ok(Html(html));
    }

    // The posted date and status are the server's business: default a
    // missing or blank posted date to today and create the task open.
    let posted_date = match form.posted_date {
        Some(value) if !value.trim().is_empty() => value,
        _ => chrono::Utc::now().format("%m/%d/%Y").to_string(),
    };
    let status = form.status.unwrap_or(STATUS_OPEN);

    task_service
        .create_task(
            user.id,
            form.name,
            form.due_date,
            form.priority,
            posted_date,
            status,
        )
        .await?;

    let html = render_task_list(
        &task_service,
        &user,
        Some("New entry was successfully posted. Thanks.".to_string()),
    )
    .await?;
    Ok(Html(html))
}

/// Handler for marking a task as complete. A task ID that does not
/// belong to the current user changes nothing.
#[tracing::instrument(skip(state))]
async fn complete_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Html<String>, TaskError> {
    let task_service = TaskService::new(&state.db);

    let message = match task_service.complete_task(user.id, id).await {
        Ok(_) => Some("The task was marked as complete.".to_string()),
        Err(TaskServiceError::TaskNotFound(_)) => None,
        Err(err) => return Err(TaskError::Service(err)),
    };

    let html = render_task_list(&task_service, &user, message).await?;
    Ok(Html(html))
}

/// Handler for deleting a task. A task ID that does not belong to the
/// current user changes nothing.
#[tracing::instrument(skip(state))]
async fn delete_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Html<String>, TaskError> {
    let task_service = TaskService::new(&state.db);

    let message = match task_service.delete_task(user.id, id).await {
        Ok(_) => Some("The task was deleted.".to_string()),
        Err(TaskServiceError::TaskNotFound(_)) => None,
        Err(err) => return Err(TaskError::Service(err)),
    };

    let html = render_task_list(&task_service, &user, message).await?;
    Ok(Html(html))
}

/// Creates and returns the task router with all task-related routes.
/// Every route here sits behind the session gate.
pub fn create_task_router(state: Arc<TaskState>) -> Router {
    Router::new()
        .route("/tasks/", get(tasks_handler))
        .route("/add/", post(add_task_handler))
        .route("/complete/{id}/", get(complete_task_handler))
        .route("/delete/{id}/", get(delete_task_handler))
        .with_state(state)
}
