use mongodb::{Client, ClientSession, Database};

use crate::resp::problem::Problem;

/// Handle to the backing document store.
///
/// Constructed once in [`crate::create`] and managed by Rocket; handlers
/// receive it through `&State<Store>`. Carrying the [`Client`] alongside the
/// [`Database`] lets multi-document writes run inside a session transaction.
#[derive(Debug, Clone)]
pub struct Store {
    pub client: Client,
    pub database: Database,
}

impl Store {
    pub fn new(client: Client, database_name: &str) -> Store {
        let database = client.database(database_name);
        Store { client, database }
    }

    pub fn collection<T>(&self, name: &str) -> mongodb::Collection<T> {
        self.database.collection(name)
    }

    pub async fn start_transaction(&self) -> Result<ClientSession, Problem> {
        let mut session = self.client.start_session(None).await.map_err(Problem::from)?;
        session.start_transaction(None).await.map_err(Problem::from)?;
        Ok(session)
    }
}
