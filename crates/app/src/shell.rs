//! Line-driven text front end over `SessionController`.

use crosspoint_core::model::QuestionDraft;
use services::controller::{Banner, FeedScreen, PostScreen, QuizProgress, QuizScreen};
use services::{Screen, SessionController};
use tokio::io::{self, AsyncBufReadExt, BufReader};

const HELP: &str = "\
commands:
  feed                              show the question feed
  post                              open the post form
  post <category> | <title> | <body>  publish a question
  quiz <category>                   take a category quiz
  select <n|option>                 pick an option (1-based or exact text)
  submit                            submit the selected option
  cancel                            abandon the quiz
  dismiss <banner id>               hide a banner
  signout                           sign out and stop
  help                              show this text
  quit                              exit";

pub fn print_fatal(message: &str) {
    println!("!! {message}");
}

pub fn print_screen(screen: &Screen) {
    match screen {
        Screen::Loading => println!("Loading..."),
        Screen::Fatal { message } => print_fatal(message),
        Screen::Feed(feed) => print_feed(feed),
        Screen::Post(post) => print_post(post),
        Screen::Quiz(quiz) => print_quiz(quiz),
    }
}

fn print_banners(banners: &[Banner]) {
    for banner in banners {
        println!("[{}] {}", banner.id, banner.message);
    }
}

fn print_feed(feed: &FeedScreen) {
    print_banners(&feed.banners);
    println!("Signed in as {}", feed.user.display_name());
    if let Some(notice) = &feed.notice {
        println!("* {notice}");
    }
    let verified: Vec<&str> = feed.verified.iter().map(|c| c.as_str()).collect();
    println!(
        "Verified in: {}",
        if verified.is_empty() {
            "nothing yet".to_string()
        } else {
            verified.join(", ")
        }
    );
    let quizzes: Vec<&str> = feed.quiz_categories.iter().map(|c| c.as_str()).collect();
    println!("Quizzes: {}", quizzes.join(", "));
    if feed.cards.is_empty() {
        println!("No questions yet.");
    }
    for card in &feed.cards {
        let answer = if card.can_answer { "can answer" } else { "locked" };
        let mine = if card.mine { " (yours)" } else { "" };
        println!(
            "#{} [{}] {}{mine} - {} - {answer}",
            card.id,
            card.category,
            card.title,
            card.status.as_str()
        );
        println!("    {}", card.body);
    }
}

fn print_post(post: &PostScreen) {
    print_banners(&post.banners);
    let categories: Vec<&str> = post.categories.iter().map(|c| c.as_str()).collect();
    println!("New question. Categories: {}", categories.join(", "));
    println!("Usage: post <category> | <title> | <body>");
    if post.posting {
        println!("Posting...");
    }
    if let Some(error) = &post.error {
        println!("Error: {error}");
    }
}

fn print_quiz(quiz: &QuizScreen) {
    print_banners(&quiz.banners);
    println!(
        "{} quiz, question {} of {} (score {})",
        quiz.category,
        quiz.index + 1,
        quiz.total,
        quiz.score
    );
    println!("{}", quiz.prompt);
    for (i, option) in quiz.options.iter().enumerate() {
        let marker = if quiz.selected.as_deref() == Some(option.as_str()) {
            '>'
        } else {
            ' '
        };
        println!(" {marker} {}. {option}", i + 1);
    }
    if let Some(reveal) = &quiz.revealed {
        let verdict = if reveal.correct { "Correct" } else { "Incorrect" };
        println!("{verdict}. Answer: {}", reveal.answer);
    }
}

fn parse_draft(rest: &str) -> Option<QuestionDraft> {
    let mut parts = rest.splitn(3, '|').map(str::trim);
    let category = parts.next()?;
    let title = parts.next()?;
    let body = parts.next()?;
    Some(QuestionDraft::new(title, body, category))
}

fn resolve_option(controller: &SessionController, raw: &str) -> String {
    if let (Ok(n), Screen::Quiz(quiz)) = (raw.parse::<usize>(), controller.render()) {
        if let Some(option) = n.checked_sub(1).and_then(|i| quiz.options.get(i)) {
            return option.clone();
        }
    }
    raw.to_string()
}

/// Read commands from stdin until `quit`, `signout` or end of input.
///
/// # Errors
///
/// Returns an I/O error if stdin cannot be read.
pub async fn run(controller: &SessionController) -> io::Result<()> {
    println!("{HELP}");
    print_screen(&controller.render());

    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        match command {
            "" => continue,
            "quit" | "exit" => break,
            "help" => {
                println!("{HELP}");
                continue;
            }
            "feed" => report(controller.show_feed()),
            "post" if rest.is_empty() => report(controller.show_post()),
            "post" => match parse_draft(rest) {
                Some(draft) => report(controller.post_question(&draft).await.map(|id| {
                    println!("Posted question #{id}.");
                })),
                None => println!("Usage: post <category> | <title> | <body>"),
            },
            "quiz" => report(controller.start_quiz(rest)),
            "select" => {
                let choice = resolve_option(controller, rest);
                if !controller.select_option(&choice) {
                    println!("Cannot select {choice:?} right now.");
                }
            }
            "submit" => match controller.submit_answer().await {
                Ok(progress) => print_progress(&progress),
                Err(err) => println!("Error: {err}"),
            },
            "cancel" => {
                if !controller.cancel_quiz() {
                    println!("No quiz in progress.");
                }
            }
            "dismiss" => match rest.parse::<u64>() {
                Ok(id) if controller.dismiss_banner(id) => {}
                _ => println!("No banner {rest:?}."),
            },
            "signout" => {
                controller.sign_out().await;
                println!("Signed out.");
                break;
            }
            other => {
                println!("Unknown command {other:?}. Type `help`.");
                continue;
            }
        }
        print_screen(&controller.render());
    }
    Ok(())
}

fn report<T, E: std::fmt::Display>(result: Result<T, E>) {
    if let Err(err) = result {
        println!("Error: {err}");
    }
}

fn print_progress(progress: &QuizProgress) {
    let reveal = match progress {
        QuizProgress::Next { reveal, .. }
        | QuizProgress::Completed { reveal, .. }
        | QuizProgress::Cancelled { reveal } => reveal,
    };
    let verdict = if reveal.correct { "Correct" } else { "Incorrect" };
    println!("{verdict}. Answer: {}", reveal.answer);
    match progress {
        QuizProgress::Completed { verdict, .. } => println!("{}", verdict.message()),
        QuizProgress::Cancelled { .. } => println!("Quiz cancelled."),
        QuizProgress::Next { .. } => {}
    }
}
