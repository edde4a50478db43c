use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::core::fallback::Chain;
use crate::core::ytdlp::{self, Selection, YtdlpOptions};
use crate::models::media::{MediaFormat, MediaInfo};
use crate::models::settings::Settings;
use crate::platforms::traits::MediaExtractor;
use crate::platforms::Platform;

const GRAPHQL_URL: &str =
    "https://api.x.com/graphql/4Siu98E55GquhG52zHdY5w/TweetDetail";
const TOKEN_URL: &str = "https://api.x.com/1.1/guest/activate.json";
const BEARER: &str = "Bearer AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA";

const TWEET_FEATURES: &str = r#"{"rweb_video_screen_enabled":false,"payments_enabled":false,"rweb_xchat_enabled":false,"profile_label_improvements_pcf_label_in_post_enabled":true,"rweb_tipjar_consumption_enabled":true,"verified_phone_label_enabled":false,"creator_subscriptions_tweet_preview_api_enabled":true,"responsive_web_graphql_timeline_navigation_enabled":true,"responsive_web_graphql_skip_user_profile_image_extensions_enabled":false,"premium_content_api_read_enabled":false,"communities_web_enable_tweet_community_results_fetch":true,"c9s_tweet_anatomy_moderator_badge_enabled":true,"responsive_web_grok_analyze_button_fetch_trends_enabled":false,"responsive_web_grok_analyze_post_followups_enabled":true,"responsive_web_jetfuel_frame":true,"responsive_web_grok_share_attachment_enabled":true,"articles_preview_enabled":true,"responsive_web_edit_tweet_api_enabled":true,"graphql_is_translatable_rweb_tweet_is_translatable_enabled":true,"view_counts_everywhere_api_enabled":true,"longform_notetweets_consumption_enabled":true,"responsive_web_twitter_article_tweet_consumption_enabled":true,"tweet_awards_web_tipping_enabled":false,"responsive_web_grok_show_grok_translated_post":false,"responsive_web_grok_analysis_button_from_backend":true,"creator_subscriptions_quote_tweet_preview_enabled":false,"freedom_of_speech_not_reach_fetch_enabled":true,"standardized_nudges_misinfo":true,"tweet_with_visibility_results_prefer_gql_limited_actions_policy_enabled":true,"longform_notetweets_rich_text_read_enabled":true,"longform_notetweets_inline_media_enabled":true,"responsive_web_grok_image_annotation_enabled":true,"responsive_web_grok_imagine_annotation_enabled":true,"responsive_web_grok_community_note_auto_translation_is_enabled":false,"responsive_web_enhance_cards_enabled":false}"#;

const TWEET_FIELD_TOGGLES: &str = r#"{"withArticleRichContentState":true,"withArticlePlainText":false,"withGrokAnalyze":false,"withDisallowedReplyControls":false}"#;

static RESOLUTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/(\d{2,5})x(\d{2,5})/").unwrap());

const TOKEN_EXPIRED: &str = "token_expired";

/// Media list and text of one tweet, from either API.
struct Tweet {
    text: Option<String>,
    media: Vec<Value>,
}

pub struct TwitterExtractor {
    client: reqwest::Client,
    guest_token: Arc<Mutex<Option<String>>>,
    ytdlp: YtdlpOptions,
}

impl TwitterExtractor {
    pub fn new(settings: &Settings) -> Self {
        let client = crate::core::http_client::apply_global_proxy(reqwest::Client::builder())
            .user_agent(&settings.extraction.user_agent)
            .timeout(Duration::from_secs(settings.extraction.request_timeout_secs))
            .connect_timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();

        Self {
            client,
            guest_token: Arc::new(Mutex::new(None)),
            ytdlp: YtdlpOptions::from_settings(&settings.extraction).referer(Platform::Twitter.referer()),
        }
    }

    fn extract_tweet_id(url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        let segments: Vec<&str> = parsed.path().split('/').filter(|s| !s.is_empty()).collect();

        let pos = segments.iter().position(|s| *s == "status" || *s == "statuses")?;
        let id = segments.get(pos + 1)?;
        if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
            return Some(id.to_string());
        }

        None
    }

    async fn get_guest_token(&self, force: bool) -> anyhow::Result<String> {
        if !force {
            let cached = self.guest_token.lock().await;
            if let Some(ref token) = *cached {
                return Ok(token.clone());
            }
        }

        let response = self
            .client
            .post(TOKEN_URL)
            .header("Authorization", BEARER)
            .header("x-twitter-client-language", "en")
            .header("x-twitter-active-user", "yes")
            .header("Accept-Language", "en")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("guest token request failed: HTTP {}", response.status()));
        }

        let json: Value = response.json().await?;
        let token = json
            .get("guest_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("guest token missing from response"))?
            .to_string();

        let mut cached = self.guest_token.lock().await;
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn request_tweet(&self, tweet_id: &str, guest_token: &str) -> anyhow::Result<Value> {
        let variables = serde_json::json!({
            "focalTweetId": tweet_id,
            "with_rux_injections": false,
            "rankingMode": "Relevance",
            "includePromotedContent": true,
            "withCommunity": true,
            "withQuickPromoteEligibilityTweetFields": true,
            "withBirdwatchNotes": true,
            "withVoice": true
        });

        let url = format!(
            "{}?variables={}&features={}&fieldToggles={}",
            GRAPHQL_URL,
            urlencoding::encode(&variables.to_string()),
            urlencoding::encode(TWEET_FEATURES),
            urlencoding::encode(TWEET_FIELD_TOGGLES),
        );

        let cookie_val = format!("guest_id={}", urlencoding::encode(&format!("v1:{}", guest_token)));

        let response = self
            .client
            .get(&url)
            .header("Authorization", BEARER)
            .header("x-guest-token", guest_token)
            .header("x-twitter-client-language", "en")
            .header("x-twitter-active-user", "yes")
            .header("Accept-Language", "en")
            .header("Content-Type", "application/json")
            .header("Cookie", &cookie_val)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::FORBIDDEN || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(anyhow!(TOKEN_EXPIRED));
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(anyhow!("tweet not found"));
        }

        if !status.is_success() {
            return Err(anyhow!("Twitter API returned HTTP {}", status));
        }

        response.json().await.map_err(Into::into)
    }

    async fn try_graphql(&self, tweet_id: &str) -> anyhow::Result<MediaInfo> {
        let token = self.get_guest_token(false).await?;

        let json = match self.request_tweet(tweet_id, &token).await {
            Ok(json) => json,
            Err(e) if e.to_string() == TOKEN_EXPIRED => {
                tracing::debug!("Twitter: guest token rejected, refreshing");
                let new_token = self.get_guest_token(true).await?;
                self.request_tweet(tweet_id, &new_token).await?
            }
            Err(e) => return Err(e),
        };

        let tweet = Self::extract_graphql_media(&json, tweet_id)?;
        Ok(Self::media_from_tweet(&tweet))
    }

    fn calculate_syndication_token(id: &str) -> String {
        let num: f64 = id.parse().unwrap_or(0.0);
        let raw = (num / 1e15) * std::f64::consts::PI;
        let base36 = Self::f64_to_base36(raw);
        base36
            .replace('.', "")
            .trim_start_matches('0')
            .trim_end_matches('0')
            .to_string()
    }

    fn f64_to_base36(value: f64) -> String {
        if value == 0.0 {
            return "0".to_string();
        }

        let integer_part = value as u64;
        let fractional_part = value - integer_part as f64;

        let mut int_str = if integer_part == 0 {
            "0".to_string()
        } else {
            let mut n = integer_part;
            let mut digits = Vec::new();
            while n > 0 {
                digits.push(Self::base36_digit((n % 36) as u8));
                n /= 36;
            }
            digits.reverse();
            digits.into_iter().collect()
        };

        if fractional_part > 0.0 {
            int_str.push('.');
            let mut frac = fractional_part;
            for _ in 0..12 {
                frac *= 36.0;
                let digit = frac as u8;
                int_str.push(Self::base36_digit(digit));
                frac -= digit as f64;
                if frac <= 0.0 {
                    break;
                }
            }
        }

        int_str
    }

    fn base36_digit(d: u8) -> char {
        if d < 10 {
            (b'0' + d) as char
        } else {
            (b'a' + d - 10) as char
        }
    }

    async fn try_syndication(&self, tweet_id: &str) -> anyhow::Result<MediaInfo> {
        let token = Self::calculate_syndication_token(tweet_id);

        let url = format!(
            "https://cdn.syndication.twimg.com/tweet-result?id={}&token={}",
            tweet_id, token
        );

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("syndication API returned HTTP {}", response.status()));
        }

        let json: Value = response.json().await?;
        let tweet = Self::extract_syndication_media(&json)?;
        Ok(Self::media_from_tweet(&tweet))
    }

    fn extract_graphql_media(json: &Value, tweet_id: &str) -> anyhow::Result<Tweet> {
        let instructions = json
            .pointer("/data/threaded_conversation_with_injections_v2/instructions")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow!("tweet unavailable"))?;

        let add_insn = instructions
            .iter()
            .find(|i| i.get("type").and_then(|v| v.as_str()) == Some("TimelineAddEntries"))
            .ok_or_else(|| anyhow!("tweet unavailable"))?;

        let entry_id = format!("tweet-{}", tweet_id);
        let entries = add_insn
            .get("entries")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow!("tweet unavailable"))?;

        let tweet_result = entries
            .iter()
            .find(|e| e.get("entryId").and_then(|v| v.as_str()) == Some(&entry_id))
            .and_then(|e| e.pointer("/content/itemContent/tweet_results/result"))
            .ok_or_else(|| anyhow!("tweet unavailable"))?;

        let typename = tweet_result
            .get("__typename")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        match typename {
            "TweetUnavailable" | "TweetTombstone" => {
                let reason = tweet_result
                    .pointer("/result/reason")
                    .or_else(|| tweet_result.get("reason"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("");

                if reason == "Protected" {
                    return Err(anyhow!("tweet is from a protected account"));
                }

                let tombstone_text = tweet_result
                    .pointer("/tombstone/text/text")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");

                if reason == "NsfwLoggedOut" || tombstone_text.starts_with("Age-restricted") {
                    return Err(anyhow!("tweet is age restricted"));
                }

                Err(anyhow!("tweet unavailable"))
            }
            "Tweet" | "TweetWithVisibilityResults" => {
                let base_tweet = if typename == "TweetWithVisibilityResults" {
                    tweet_result.pointer("/tweet/legacy")
                } else {
                    tweet_result.get("legacy")
                };

                let base_tweet = base_tweet.ok_or_else(|| anyhow!("tweet unavailable"))?;

                let reposted_media = if typename == "TweetWithVisibilityResults" {
                    tweet_result
                        .pointer("/tweet/legacy/retweeted_status_result/result/tweet/legacy/extended_entities/media")
                } else {
                    tweet_result
                        .pointer("/legacy/retweeted_status_result/result/legacy/extended_entities/media")
                };

                let media = reposted_media
                    .or_else(|| base_tweet.pointer("/extended_entities/media"))
                    .and_then(|v| v.as_array())
                    .ok_or_else(|| anyhow!("no media in tweet"))?;

                Ok(Tweet {
                    text: base_tweet.get("full_text").and_then(|v| v.as_str()).map(String::from),
                    media: media.clone(),
                })
            }
            _ => Err(anyhow!("tweet unavailable")),
        }
    }

    fn extract_syndication_media(json: &Value) -> anyhow::Result<Tweet> {
        let media = json
            .get("mediaDetails")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow!("no media in tweet"))?;

        Ok(Tweet {
            text: json.get("text").and_then(|v| v.as_str()).map(String::from),
            media: media.clone(),
        })
    }

    /// mp4 variants, highest bitrate first.
    fn mp4_variants(media_item: &Value) -> Vec<(&str, u64)> {
        let mut variants: Vec<(&str, u64)> = media_item
            .pointer("/video_info/variants")
            .and_then(|v| v.as_array())
            .map(|list| {
                list.iter()
                    .filter(|v| v.get("content_type").and_then(|c| c.as_str()) == Some("video/mp4"))
                    .filter_map(|v| {
                        let url = v.get("url").and_then(|u| u.as_str())?;
                        let bitrate = v.get("bitrate").and_then(|b| b.as_u64()).unwrap_or(0);
                        Some((url, bitrate))
                    })
                    .collect()
            })
            .unwrap_or_default();

        variants.sort_by(|a, b| b.1.cmp(&a.1));
        variants
    }

    fn variant_height(url: &str) -> Option<u32> {
        let caps = RESOLUTION_RE.captures(url)?;
        let w: u32 = caps.get(1)?.as_str().parse().ok()?;
        let h: u32 = caps.get(2)?.as_str().parse().ok()?;
        Some(w.min(h))
    }

    fn media_from_tweet(tweet: &Tweet) -> MediaInfo {
        let mut formats = Vec::new();
        let mut duration = None;

        for (index, item) in tweet.media.iter().enumerate() {
            let kind = item.get("type").and_then(|v| v.as_str()).unwrap_or("");

            match kind {
                "photo" => {
                    if let Some(base_url) = item.get("media_url_https").and_then(|v| v.as_str()) {
                        let url = format!("{}?name=4096x4096", base_url);
                        formats.push(MediaFormat::from_url(url, format!("photo_{}", index), "Original"));
                    }
                }
                "video" | "animated_gif" => {
                    for (url, bitrate) in Self::mp4_variants(item) {
                        let height = Self::variant_height(url);
                        let label = match (kind, height) {
                            ("animated_gif", _) => "GIF".to_string(),
                            (_, Some(h)) => format!("{}p", h),
                            _ if bitrate > 0 => format!("{}kbps", bitrate / 1000),
                            _ => "Original".to_string(),
                        };

                        let mut f = MediaFormat::from_url(url, format!("{}_{}", index, bitrate), &label);
                        f.height = height;
                        f.has_audio = kind == "video";
                        formats.push(f);
                    }

                    if duration.is_none() {
                        duration = item
                            .pointer("/video_info/duration_millis")
                            .and_then(|v| v.as_f64())
                            .map(|ms| ms / 1000.0);
                    }
                }
                _ => {}
            }
        }

        let title = tweet
            .text
            .as_deref()
            .map(Self::strip_trailing_link)
            .filter(|t| !t.is_empty())
            .map(|t| t.chars().take(100).collect::<String>())
            .unwrap_or_else(|| Platform::Twitter.default_title());

        let thumbnail = tweet
            .media
            .first()
            .and_then(|m| m.get("media_url_https"))
            .and_then(|v| v.as_str())
            .map(String::from);

        MediaInfo::new(Platform::Twitter.name(), title)
            .with_formats(formats)
            .with_thumbnail(thumbnail)
            .with_duration(duration)
    }

    /// Tweet text ends with the `t.co` link to its own media.
    fn strip_trailing_link(text: &str) -> &str {
        let text = text.trim();
        match text.rsplit_once(' ') {
            Some((head, tail)) if tail.starts_with("https://t.co/") => head.trim_end(),
            None if text.starts_with("https://t.co/") => "",
            _ => text,
        }
    }
}

#[async_trait]
impl MediaExtractor for TwitterExtractor {
    fn name(&self) -> &str {
        "twitter"
    }

    fn can_handle(&self, url: &str) -> bool {
        Platform::from_url(url) == Some(Platform::Twitter)
    }

    async fn extract(&self, url: &str) -> anyhow::Result<MediaInfo> {
        let ytdlp_attempt = ytdlp::extract(
            url,
            &self.ytdlp,
            Platform::Twitter.name(),
            "Twitter Media",
            Selection::ProgressiveFirst,
        );

        let Some(tweet_id) = Self::extract_tweet_id(url) else {
            return Chain::new(self.name()).then("ytdlp", ytdlp_attempt).run().await;
        };

        Chain::new(self.name())
            .then("graphql", self.try_graphql(&tweet_id))
            .then("syndication", self.try_syndication(&tweet_id))
            .then("ytdlp", ytdlp_attempt)
            .run()
            .await
    }
}
