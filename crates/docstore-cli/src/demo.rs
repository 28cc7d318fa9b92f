//! Fixed demonstration sequence: raw record CRUD, then the typed Post model

use crate::post::Post;
use bson::{doc, Bson};
use docstore_mongodb::{ConnectionHandle, Document, Filter, Record, Result};
use futures::TryStreamExt;
use tracing::info;

/// Collection used for the untyped part of the demonstration
pub const POSTS: &str = "posts";

/// Knobs for [`run`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoOptions {
    /// Leave existing data in place instead of dropping the database first
    pub keep: bool,
    /// Print records as relaxed extended JSON
    pub json: bool,
}

/// Render a record for the terminal
pub fn render(record: &Record, json: bool) -> String {
    if json {
        Bson::Document(record.clone()).into_relaxed_extjson().to_string()
    } else {
        record.to_string()
    }
}

fn render_ids(ids: &[Bson]) -> String {
    let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
    format!("[{}]", ids.join(", "))
}

/// Run the demonstration against an open handle
pub async fn run(handle: &mut ConnectionHandle, options: DemoOptions) -> Result<()> {
    if !options.keep {
        handle.drop_database().await?;
    }
    Post::register(handle)?;
    let handle = &*handle;

    // Untyped records
    let id = handle
        .insert(
            POSTS,
            doc! {
                "title": "Python and MongoDB",
                "content": "PyMongo is fun, you guys",
                "author": "Roy",
            },
        )
        .await?;
    println!("One post: {}", id);

    let ids = handle
        .insert_many(
            POSTS,
            vec![
                doc! {
                    "title": "Virtual Environments",
                    "content": "Use virtual environments, you guys",
                    "author": "Scott",
                },
                doc! {
                    "title": "Learning Python",
                    "content": "Learn Python, it is easy",
                    "author": "Bill",
                },
            ],
        )
        .await?;
    println!("Multiple posts: {}", render_ids(&ids));

    match handle.find_one(POSTS, Filter::new().eq("author", "Bill")).await? {
        Some(post) => println!("{}", render(&post, options.json)),
        None => println!("No post by Bill"),
    }

    println!("Scott's Posts:");
    let scotts_posts = handle.find(POSTS, Filter::new().eq("author", "Scott"))?;
    let mut stream = scotts_posts.stream().await?;
    while let Some(post) = stream.try_next().await? {
        println!("{}", render(&post, options.json));
    }

    // Typed model: the first save inserts, the second updates in place
    let mut post = Post::new("Sample Post", "Some engaging content", "Scott");
    let post_id = post.save(handle).await?;
    println!("{}", post.title);

    post.title = "A Better Post Title".to_string();
    post.save(handle).await?;
    println!("{}", post.title);

    let stored = Post::find_by_id(handle, post_id).await?;
    info!(
        id = %post_id,
        title = stored.as_ref().map(|p| p.title.as_str()).unwrap_or_default(),
        "Post saved"
    );

    let by_scott = Post::count(handle, Filter::new().eq("author", "Scott")).await?;
    println!("Posts by Scott (typed): {}", by_scott);

    Ok(())
}
