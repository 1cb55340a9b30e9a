//! Command-line parsing and command execution

use api_client::{AuthSession, ProfileUpdate};
use serde_json::{Value, json};

pub const USAGE: &str = "\
usage: fitness-cli [--config <path>] <command>

commands:
  login <email> <password>
  logout
  signup <name> <email> <password>
  groups
  exercises <group>
  exercise <id>
  done <id>
  history
  whoami
  profile <name> [<password> <old_password>]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { email: String, password: String },
    Logout,
    SignUp { name: String, email: String, password: String },
    Groups,
    Exercises { group: String },
    Exercise { id: String },
    Done { id: String },
    History,
    WhoAmI,
    Profile { name: String, password: Option<(String, String)> },
}

#[derive(Debug, PartialEq, Eq)]
pub struct Invocation {
    pub config: Option<String>,
    pub command: Command,
}

impl Command {
    /// Whether the command needs a signed-in session.
    pub fn requires_session(&self) -> bool {
        !matches!(
            self,
            Command::Login { .. } | Command::Logout | Command::SignUp { .. } | Command::WhoAmI
        )
    }

    /// Shown when a failure carries no server message.
    pub fn fallback_message(&self) -> &'static str {
        match self {
            Command::Login { .. } => "Não foi possível logar na aplicação. Tente novamente",
            Command::Logout => "Não foi possível sair da aplicação.",
            Command::SignUp { .. } => "Não foi possível criar a conta. Tente novamente",
            Command::Groups => "Não foi possível carregar os grupos musculares.",
            Command::Exercises { .. } => {
                "Não foi possível carregar os exercicios do grupo selecionado."
            }
            Command::Exercise { .. } => "Não foi possível carregar os detalhes do exercício.",
            Command::Done { .. } => "Não foi possível marcar o exercício.",
            Command::History => "Não foi possível carregar o histórico de exercícios.",
            Command::WhoAmI => "Não foi possível carregar o usuário.",
            Command::Profile { .. } => "Não foi possível atualizar o perfil.",
        }
    }
}

/// Parse the arguments that follow the program name.
pub fn parse(args: &[String]) -> Result<Invocation, String> {
    let mut config = None;
    let mut rest = Vec::with_capacity(args.len());
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let path = iter.next().ok_or("--config requires a path")?;
            config = Some(path.clone());
        } else {
            rest.push(arg.as_str());
        }
    }

    let command = match rest.as_slice() {
        ["login", email, password] => Command::Login {
            email: email.to_string(),
            password: password.to_string(),
        },
        ["logout"] => Command::Logout,
        ["signup", name, email, password] => Command::SignUp {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        },
        ["groups"] => Command::Groups,
        ["exercises", group] => Command::Exercises {
            group: group.to_string(),
        },
        ["exercise", id] => Command::Exercise { id: id.to_string() },
        ["done", id] => Command::Done { id: id.to_string() },
        ["history"] => Command::History,
        ["whoami"] => Command::WhoAmI,
        ["profile", name] => Command::Profile {
            name: name.to_string(),
            password: None,
        },
        ["profile", name, password, old_password] => Command::Profile {
            name: name.to_string(),
            password: Some((password.to_string(), old_password.to_string())),
        },
        [] => return Err("missing command".into()),
        [other, ..] => return Err(format!("unknown or malformed command: {other}")),
    };

    Ok(Invocation { config, command })
}

/// Run `command` against the session and return its JSON output.
pub async fn execute(session: &AuthSession, command: &Command) -> api_client::Result<Value> {
    let client = session.client();
    let output = match command {
        Command::Login { email, password } => {
            let user = session.sign_in(email, password).await?;
            to_json(&*user)?
        }
        Command::Logout => {
            session.sign_out().await?;
            json!({ "signed_out": true })
        }
        Command::SignUp {
            name,
            email,
            password,
        } => {
            client.sign_up(name, email, password).await?;
            let user = session.sign_in(email, password).await?;
            to_json(&*user)?
        }
        Command::Groups => to_json(&client.groups().await?)?,
        Command::Exercises { group } => to_json(&client.exercises_by_group(group).await?)?,
        Command::Exercise { id } => {
            let exercise = client.exercise(id).await?;
            let demo = client.demo_url(&exercise.demo);
            let mut value = to_json(&exercise)?;
            value["demo_url"] = Value::String(demo);
            value
        }
        Command::Done { id } => {
            client.mark_done(id).await?;
            json!({ "exercise_id": id, "done": true })
        }
        Command::History => to_json(&client.history().await?)?,
        Command::WhoAmI => match session.user() {
            Some(user) => to_json(&*user)?,
            None => Value::Null,
        },
        Command::Profile { name, password } => {
            let update = ProfileUpdate {
                name: name.clone(),
                password: password.as_ref().map(|(new, _)| new.clone()),
                old_password: password.as_ref().map(|(_, old)| old.clone()),
            };
            client.update_profile(&update).await?;
            let current = session
                .user()
                .ok_or_else(|| api_client::Error::InvalidRequest("not signed in".into()))?;
            let user = session.update_user_profile(current.with_name(name)).await?;
            to_json(&*user)?
        }
    };
    Ok(output)
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> api_client::Result<Value> {
    serde_json::to_value(value).map_err(|e| api_client::Error::Decode(e.to_string()))
}
