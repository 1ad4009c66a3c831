//! One-shot client requests.

use agenda_protocol::{Response, Snapshot};
use agenda_server::Client;
use tracing::debug;

type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Add a contact.
pub async fn add(server: &str, name: &str, phone: &str) -> CommandResult {
    let mut client = connect(server).await?;
    report(client.add(name, phone).await?)
}

/// Remove a contact.
pub async fn remove(server: &str, name: &str) -> CommandResult {
    let mut client = connect(server).await?;
    report(client.remove(name).await?)
}

/// Update a contact's phone.
pub async fn update(server: &str, name: &str, phone: &str) -> CommandResult {
    let mut client = connect(server).await?;
    report(client.update(name, phone).await?)
}

/// Print the directory in `format` (text or json).
pub async fn view(server: &str, format: &str) -> CommandResult {
    let mut client = connect(server).await?;
    let snapshot = client.view().await?;
    println!("{}", render(&snapshot, format)?);
    Ok(())
}

async fn connect(server: &str) -> Result<Client, Box<dyn std::error::Error>> {
    debug!(server, "connecting");
    Ok(Client::connect(server).await?)
}

fn report(response: Response) -> CommandResult {
    match response {
        Response::Error(text) => Err(text.into()),
        other => {
            println!("{other}");
            Ok(())
        }
    }
}

fn render(snapshot: &Snapshot, format: &str) -> Result<String, Box<dyn std::error::Error>> {
    match format {
        "json" => Ok(serde_json::to_string_pretty(snapshot)?),
        "text" => Ok(Response::directory(snapshot.clone()).to_string()),
        other => Err(format!("unknown format '{other}' (expected text or json)").into()),
    }
}
