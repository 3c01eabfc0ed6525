use crate::entities::*;
use sea_orm::*;

pub mod web;

/// Status value for a task that still needs doing.
pub const STATUS_OPEN: i32 = 1;
/// Status value for a completed task.
pub const STATUS_CLOSED: i32 = 0;

/// A to-do item owned by a user.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Task {
    id: i32,
    name: String,
    due_date: String,
    priority: i32,
    posted_date: String,
    status: i32,
    user_id: i32,
}

impl Task {
    /// Returns the ID of the task.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Returns the name of the task.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the due date of the task.
    pub fn due_date(&self) -> &str {
        &self.due_date
    }

    /// Returns the priority of the task.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Returns the date the task was posted.
    pub fn posted_date(&self) -> &str {
        &self.posted_date
    }

    /// Returns true while the task has not been completed.
    pub fn is_open(&self) -> bool {
        self.status == STATUS_OPEN
    }

    /// Returns the ID of the owning user.
    pub fn user_id(&self) -> i32 {
        self.user_id
    }
}

impl From<tasks::Model> for Task {
    fn from(model: tasks::Model) -> Self {
        Task {
            id: model.id,
            name: model.name,
            due_date: model.due_date,
            priority: model.priority,
            posted_date: model.posted_date,
            status: model.status,
            user_id: model.user_id,
        }
    }
}

/// Error type for TaskService operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskServiceError {
    /// The task does not exist, or belongs to a different user.
    #[error("Task with ID {0} not found for this user")]
    TaskNotFound(i32),
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub struct TaskService<'a> {
    db: &'a DatabaseConnection,
}

impl TaskService<'_> {
    pub fn new(db: &DatabaseConnection) -> TaskService {
        TaskService { db }
    }

    /// Retrieves the open tasks of the given user, ordered by due date.
    #[tracing::instrument(skip(self))]
    pub async fn open_tasks(&self, user_id: i32) -> Result<Vec<Task>, TaskServiceError> {
        self.tasks_with_status(user_id, STATUS_OPEN).await
    }

    /// Retrieves the completed tasks of the given user, ordered by due
    /// date.
    #[tracing::instrument(skip(self))]
    pub async fn closed_tasks(&self, user_id: i32) -> Result<Vec<Task>, TaskServiceError> {
        self.tasks_with_status(user_id, STATUS_CLOSED).await
    }

    async fn tasks_with_status(
        &self,
        user_id: i32,
        status: i32,
    ) -> Result<Vec<Task>, TaskServiceError> {
        let task_list = tasks::Entity::find()
            .filter(tasks::Column::UserId.eq(user_id))
            .filter(tasks::Column::Status.eq(status))
            .order_by_asc(tasks::Column::DueDate)
            .all(self.db)
            .await?
            .into_iter()
            .map(Task::from)
            .collect();
        Ok(task_list)
    }

    /// Creates a new open task owned by the given user.
    #[tracing::instrument(skip(self))]
    pub async fn create_task(
        &self,
        user_id: i32,
        name: String,
        due_date: String,
        priority: i32,
        posted_date: String,
        status: i32,
    ) -> Result<Task, TaskServiceError> {
        let active_model = tasks::ActiveModel {
            name: ActiveValue::Set(name),
            due_date: ActiveValue::Set(due_date),
            priority: ActiveValue::Set(priority),
            posted_date: ActiveValue::Set(posted_date),
            status: ActiveValue::Set(status),
            user_id: ActiveValue::Set(user_id),
            ..Default::default()
        };
        let created_model = active_model.insert(self.db).await?;
        Ok(Task::from(created_model))
    }

    /// Marks a task as complete. The task must belong to the given
    /// user; someone else's task ID behaves like a missing one.
    #[tracing::instrument(skip(self))]
    pub async fn complete_task(&self, user_id: i32, task_id: i32) -> Result<Task, TaskServiceError> {
        let task_to_update = self.owned_task(user_id, task_id).await?;

        let mut active_model: tasks::ActiveModel = task_to_update.into();
        active_model.status = ActiveValue::Set(STATUS_CLOSED);
        let updated_model = active_model.update(self.db).await?;

        Ok(Task::from(updated_model))
    }

    /// Deletes a task. The task must belong to the given user; someone
    /// else's task ID behaves like a missing one.
    #[tracing::instrument(skip(self))]
    pub async fn delete_task(&self, user_id: i32, task_id: i32) -> Result<Task, TaskServiceError> {
        let task_to_delete = self.owned_task(user_id, task_id).await?;

        let deleted_copy = Task::from(task_to_delete.clone());
        task_to_delete.delete(self.db).await?;
        Ok(deleted_copy)
    }

    /// Fetches a task by ID, scoped to its owner.
    async fn owned_task(
        &self,
        user_id: i32,
        task_id: i32,
    ) -> Result<tasks::Model, TaskServiceError> {
        tasks::Entity::find_by_id(task_id)
            .filter(tasks::Column::UserId.eq(user_id))
            .one(self.db)
            .await?
            .ok_or(TaskServiceError::TaskNotFound(task_id))
    }
}
