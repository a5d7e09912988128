use chrono::Utc;
use mongodb::{bson::doc, options::UpdateOptions};
use rocket::{serde::json::Json, Route};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::{AuthToken, ProfileView},
    db::Profile,
    mongodb::Coll,
};

pub fn routes() -> Vec<Route> {
    routes![get_profile, put_profile]
}

#[get("/profile")]
async fn get_profile(token: AuthToken, profiles: Coll<Profile>) -> Result<Json<ProfileView>> {
    profiles
        .find_one(token.id.as_doc(), None)
        .await?
        .map(|profile| Json(profile.into()))
        .ok_or_else(|| Error::not_found(format!("Profile for user {}", token.id)))
}

/// Fields a user may set on their own profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[put("/profile", data = "<update>", format = "json")]
async fn put_profile(
    token: AuthToken,
    update: Json<ProfileUpdate>,
    profiles: Coll<Profile>,
) -> Result<Json<ProfileView>> {
    let now = mongodb::bson::DateTime::from_chrono(Utc::now());
    let mut set = doc! { "updated_at": now };
    if let Some(ref full_name) = update.full_name {
        set.insert("full_name", full_name.clone());
    }
    if let Some(ref avatar_url) = update.avatar_url {
        set.insert("avatar_url", avatar_url.clone());
    }
    let update_doc = doc! {
        "$set": set,
        "$setOnInsert": { "created_at": now },
    };
    let upsert = UpdateOptions::builder().upsert(true).build();
    profiles
        .update_one(token.id.as_doc(), update_doc, upsert)
        .await?;

    let profile = profiles
        .find_one(token.id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Profile for user {}", token.id)))?;
    Ok(Json(profile.into()))
}
