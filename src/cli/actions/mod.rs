pub mod login;
pub mod unlock;

mod console;
mod run;

#[derive(Debug)]
pub enum Action {
    Login(login::Args),
    Unlock(unlock::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
