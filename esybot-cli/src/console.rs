//! Console simulator for `esybot sim`.
//!
//! Plain lines are sent as chat messages (`/cmd` included). Lines starting
//! with `!` are console commands:
//!
//! | input              | effect                                   |
//! |--------------------|------------------------------------------|
//! | `!cb <data>`       | press a button carrying `<data>`         |
//! | `!photo [caption]` | send media (`!document`, `!voice`, ...)  |
//! | `!vars`            | print every variable                     |
//! | `!stats`           | print runtime counters                   |
//! | `!help`            | print this table                         |
//! | `!quit`            | leave                                    |

use std::io::{BufRead, Write};
use std::sync::Arc;

use esybot::messenger::OutboundCall;
use esybot::{
    ContentType, InboundEvent, MessageRef, OutboundMessage, RecordingMessenger, Runtime, Sender,
};

use crate::config::CliResult;

pub const HELP: &str = "\
/cmd or text     send a message
!cb <data>       press a button
!photo [caption] send media (also !document, !voice, !sticker)
!vars            show variables
!stats           show counters
!quit            exit";

/// What the console should do with one line of input.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Event(InboundEvent),
    Vars,
    Stats,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub struct Console {
    runtime: Arc<Runtime>,
    messenger: Arc<RecordingMessenger>,
    sender: Sender,
    chat_id: i64,
    message_seq: i64,
    /// Ids handed out by the recording messenger, in order.
    bot_messages: i64,
    last_bot_message: Option<MessageRef>,
}

impl Console {
    pub fn new(
        runtime: Arc<Runtime>,
        messenger: Arc<RecordingMessenger>,
        chat_id: i64,
        first_name: &str,
    ) -> Self {
        Self {
            runtime,
            messenger,
            sender: Sender {
                user_id: chat_id,
                first_name: first_name.to_string(),
                username: None,
            },
            chat_id,
            message_seq: 0,
            bot_messages: 0,
            last_bot_message: None,
        }
    }

    pub fn parse(&mut self, line: &str) -> Input {
        let line = line.trim();
        if line.is_empty() {
            return Input::Empty;
        }
        let Some(command) = line.strip_prefix('!') else {
            self.message_seq += 1;
            return Input::Event(InboundEvent::Message {
                sender: self.sender.clone(),
                chat_id: self.chat_id,
                message_id: self.message_seq,
                text: line.to_string(),
            });
        };

        let (name, rest) = command
            .split_once(char::is_whitespace)
            .map(|(n, r)| (n, r.trim()))
            .unwrap_or((command, ""));
        match name.to_ascii_lowercase().as_str() {
            "quit" | "exit" | "q" => Input::Quit,
            "help" | "h" => Input::Help,
            "vars" => Input::Vars,
            "stats" => Input::Stats,
            "cb" if !rest.is_empty() => {
                self.message_seq += 1;
                Input::Event(InboundEvent::Callback {
                    sender: self.sender.clone(),
                    chat_id: self.chat_id,
                    callback_id: format!("sim-{}", self.message_seq),
                    data: rest.to_string(),
                    message: self.last_bot_message,
                })
            }
            other => match other.parse::<ContentType>() {
                Ok(content) => {
                    self.message_seq += 1;
                    Input::Event(InboundEvent::Media {
                        sender: self.sender.clone(),
                        chat_id: self.chat_id,
                        message_id: self.message_seq,
                        content,
                        caption: Some(rest.to_string()).filter(|c| !c.is_empty()),
                    })
                }
                Err(_) => Input::Unknown(line.to_string()),
            },
        }
    }

    /// Handles one line and returns the output lines. `None` means quit.
    pub async fn execute(&mut self, line: &str) -> Option<Vec<String>> {
        let output = match self.parse(line) {
            Input::Quit => return None,
            Input::Empty => Vec::new(),
            Input::Help => HELP.lines().map(str::to_string).collect(),
            Input::Unknown(line) => vec![format!("unknown console command: {}", line)],
            Input::Vars => self
                .runtime
                .snapshot()
                .into_iter()
                .map(|(name, value)| format!("{} = {}", name, value))
                .collect(),
            Input::Stats => {
                let stats = self.runtime.stats();
                vec![format!(
                    "events={} handled={} unhandled={} script_errors={} effect_failures={}",
                    stats.events,
                    stats.handled,
                    stats.unhandled,
                    stats.script_errors,
                    stats.effect_failures
                )]
            }
            Input::Event(event) => match self.runtime.handle_event(&event).await {
                Some(_) => self.drain().await,
                None => vec!["(no handler)".to_string()],
            },
        };
        Some(output)
    }

    async fn drain(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        for call in self.messenger.take().await {
            match call {
                OutboundCall::Send { message, .. } => {
                    self.remember_sent();
                    render(&mut lines, "bot>", &message);
                }
                OutboundCall::Reply {
                    reply_to, message, ..
                } => {
                    self.remember_sent();
                    render(&mut lines, &format!("bot (reply to #{})>", reply_to), &message);
                }
                OutboundCall::Edit { target, message } => {
                    render(&mut lines, &format!("bot (edit #{})>", target.message_id), &message);
                }
                OutboundCall::Answer { text, alert, .. } => {
                    let prefix = if alert { "bot (alert)>" } else { "bot (toast)>" };
                    lines.push(format!("{} {}", prefix, text.unwrap_or_default()));
                }
            }
        }
        lines
    }

    fn remember_sent(&mut self) {
        self.bot_messages += 1;
        self.last_bot_message = Some(MessageRef {
            chat_id: self.chat_id,
            message_id: self.bot_messages,
        });
    }

    pub async fn run<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> CliResult<()> {
        writeln!(output, "Type !help for commands, !quit to leave.")?;
        for line in input.lines() {
            let line = line?;
            match self.execute(&line).await {
                Some(lines) => {
                    for line in lines {
                        writeln!(output, "{}", line)?;
                    }
                    output.flush()?;
                }
                None => break,
            }
        }
        Ok(())
    }
}

fn render(lines: &mut Vec<String>, prefix: &str, message: &OutboundMessage) {
    lines.push(format!("{} {}", prefix, message.text));
    if let Some(markup) = &message.markup {
        let buttons: Vec<String> = markup
            .labels()
            .into_iter()
            .map(|label| format!("[{}]", label))
            .collect();
        lines.push(format!("     {}", buttons.join(" ")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esybot::{RuntimeConfig, load_declaration};

    const BOT: &str = r#"
[BOT]
token = 1:sim

[VARS]
count = 0

[START]
text = Count: $count
button1 = Add|add

[add]
inc = count
text = Count: $count
"#;

    fn console() -> Console {
        let declaration = load_declaration(BOT.as_bytes(), Some("bot.ini")).unwrap();
        let messenger = Arc::new(RecordingMessenger::new());
        let runtime =
            Runtime::new(declaration, RuntimeConfig::default(), messenger.clone()).unwrap();
        Console::new(Arc::new(runtime), messenger, 1, "Tester")
    }

    #[test]
    fn test_parse() {
        let mut console = console();
        assert_eq!(console.parse("  "), Input::Empty);
        assert_eq!(console.parse("!quit"), Input::Quit);
        assert_eq!(console.parse("!VARS"), Input::Vars);
        assert!(matches!(
            console.parse("!photo beach"),
            Input::Event(InboundEvent::Media { content: ContentType::Photo, caption: Some(ref c), .. }) if c == "beach"
        ));
        assert!(matches!(console.parse("!cb"), Input::Unknown(_)));
        assert!(matches!(
            console.parse("/start"),
            Input::Event(InboundEvent::Message { ref text, .. }) if text == "/start"
        ));
    }

    #[tokio::test]
    async fn test_session() {
        let mut console = console();
        let lines = console.execute("/start").await.unwrap();
        assert_eq!(lines, vec!["bot> Count: 0", "     [Add]"]);

        // text is rendered before inc in the sections dialect
        let lines = console.execute("!cb add").await.unwrap();
        assert_eq!(
            lines,
            vec!["bot (edit #1)> Count: 0", "bot (toast)> OK"]
        );

        let lines = console.execute("!vars").await.unwrap();
        assert_eq!(lines, vec!["count = 1"]);
        assert_eq!(
            console.execute("hello").await.unwrap(),
            vec!["(no handler)"]
        );
        assert!(console.execute("!quit").await.is_none());
    }

    #[tokio::test]
    async fn test_run_loop() {
        let mut console = console();
        let mut output = Vec::new();
        console
            .run("/start\n!quit\n/start\n".as_bytes(), &mut output)
            .await
            .unwrap();
        let output = String::from_utf8(output).unwrap();
        assert_eq!(output.matches("Count: 0").count(), 1);
    }
}
