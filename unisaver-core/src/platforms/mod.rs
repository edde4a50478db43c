#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    YouTube,
    Facebook,
    Instagram,
    TikTok,
    Twitter,
    Threads,
    Pinterest,
    Vimeo,
    Dailymotion,
    Twitch,
    Spotify,
    SoundCloud,
    Bandcamp,
    Deezer,
    AppleMusic,
    AmazonMusic,
    Mixcloud,
    Audiomack,
}

impl Platform {
    pub const ALL: [Platform; 18] = [
        Platform::YouTube,
        Platform::Facebook,
        Platform::Instagram,
        Platform::TikTok,
        Platform::Twitter,
        Platform::Threads,
        Platform::Pinterest,
        Platform::Vimeo,
        Platform::Dailymotion,
        Platform::Twitch,
        Platform::Spotify,
        Platform::SoundCloud,
        Platform::Bandcamp,
        Platform::Deezer,
        Platform::AppleMusic,
        Platform::AmazonMusic,
        Platform::Mixcloud,
        Platform::Audiomack,
    ];

    /// Detects the platform from the URL host. Scheme-less input such as
    /// `youtu.be/abc` is retried with `https://`, and only input that still
    /// fails to parse falls back to substring matching.
    pub fn from_url(url: &str) -> Option<Self> {
        let trimmed = url.trim();
        let parsed = url::Url::parse(trimmed)
            .ok()
            .filter(|u| u.host_str().is_some())
            .or_else(|| url::Url::parse(&format!("https://{}", trimmed)).ok());

        match parsed.as_ref().and_then(|u| u.host_str()) {
            Some(host) => Self::from_host(&host.to_lowercase()),
            None => Self::from_substring(&trimmed.to_lowercase()),
        }
    }

    pub fn from_host(host: &str) -> Option<Self> {
        let host = host.trim_end_matches('.');

        if host_is(host, "youtube.com") || host_is(host, "youtu.be") {
            return Some(Platform::YouTube);
        }
        if host_is(host, "facebook.com") || host_is(host, "fb.watch") || host_is(host, "fb.com") {
            return Some(Platform::Facebook);
        }
        if host_is(host, "instagram.com") {
            return Some(Platform::Instagram);
        }
        if host_is(host, "tiktok.com") {
            return Some(Platform::TikTok);
        }
        if host_is(host, "twitter.com") || host_is(host, "x.com") {
            return Some(Platform::Twitter);
        }
        if host_is(host, "threads.net") || host_is(host, "threads.com") {
            return Some(Platform::Threads);
        }
        if host.split('.').any(|label| label == "pinterest") || host_is(host, "pin.it") {
            return Some(Platform::Pinterest);
        }
        if host_is(host, "vimeo.com") {
            return Some(Platform::Vimeo);
        }
        if host_is(host, "dailymotion.com") || host_is(host, "dai.ly") {
            return Some(Platform::Dailymotion);
        }
        if host_is(host, "twitch.tv") {
            return Some(Platform::Twitch);
        }
        if host_is(host, "spotify.com") {
            return Some(Platform::Spotify);
        }
        if host_is(host, "soundcloud.com") {
            return Some(Platform::SoundCloud);
        }
        if host_is(host, "bandcamp.com") {
            return Some(Platform::Bandcamp);
        }
        if host_is(host, "deezer.com") {
            return Some(Platform::Deezer);
        }
        if host_is(host, "music.apple.com") {
            return Some(Platform::AppleMusic);
        }
        if host.starts_with("music.amazon.") {
            return Some(Platform::AmazonMusic);
        }
        if host_is(host, "mixcloud.com") {
            return Some(Platform::Mixcloud);
        }
        if host_is(host, "audiomack.com") {
            return Some(Platform::Audiomack);
        }

        None
    }

    fn from_substring(input: &str) -> Option<Self> {
        const NEEDLES: &[(&str, Platform)] = &[
            ("youtube.com", Platform::YouTube),
            ("youtu.be", Platform::YouTube),
            ("facebook.com", Platform::Facebook),
            ("fb.watch", Platform::Facebook),
            ("instagram.com", Platform::Instagram),
            ("tiktok.com", Platform::TikTok),
            ("twitter.com", Platform::Twitter),
            ("threads.net", Platform::Threads),
            ("pinterest.", Platform::Pinterest),
            ("vimeo.com", Platform::Vimeo),
            ("dailymotion.com", Platform::Dailymotion),
            ("twitch.tv", Platform::Twitch),
            ("spotify.com", Platform::Spotify),
            ("soundcloud.com", Platform::SoundCloud),
            ("bandcamp.com", Platform::Bandcamp),
            ("deezer.com", Platform::Deezer),
            ("music.apple.com", Platform::AppleMusic),
            ("music.amazon.", Platform::AmazonMusic),
            ("mixcloud.com", Platform::Mixcloud),
            ("audiomack.com", Platform::Audiomack),
        ];

        NEEDLES
            .iter()
            .find(|(needle, _)| input.contains(needle))
            .map(|(_, p)| *p)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        if name == "x" {
            return Some(Platform::Twitter);
        }
        Self::ALL.into_iter().find(|p| {
            p.name() == name || p.display_name().to_lowercase() == name
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Platform::YouTube => "youtube",
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::TikTok => "tiktok",
            Platform::Twitter => "twitter",
            Platform::Threads => "threads",
            Platform::Pinterest => "pinterest",
            Platform::Vimeo => "vimeo",
            Platform::Dailymotion => "dailymotion",
            Platform::Twitch => "twitch",
            Platform::Spotify => "spotify",
            Platform::SoundCloud => "soundcloud",
            Platform::Bandcamp => "bandcamp",
            Platform::Deezer => "deezer",
            Platform::AppleMusic => "apple_music",
            Platform::AmazonMusic => "amazon_music",
            Platform::Mixcloud => "mixcloud",
            Platform::Audiomack => "audiomack",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::YouTube => "YouTube",
            Platform::Facebook => "Facebook",
            Platform::Instagram => "Instagram",
            Platform::TikTok => "TikTok",
            Platform::Twitter => "Twitter",
            Platform::Threads => "Threads",
            Platform::Pinterest => "Pinterest",
            Platform::Vimeo => "Vimeo",
            Platform::Dailymotion => "Dailymotion",
            Platform::Twitch => "Twitch",
            Platform::Spotify => "Spotify",
            Platform::SoundCloud => "SoundCloud",
            Platform::Bandcamp => "Bandcamp",
            Platform::Deezer => "Deezer",
            Platform::AppleMusic => "Apple Music",
            Platform::AmazonMusic => "Amazon Music",
            Platform::Mixcloud => "Mixcloud",
            Platform::Audiomack => "Audiomack",
        }
    }

    pub fn referer(&self) -> &'static str {
        match self {
            Platform::YouTube => "https://www.youtube.com/",
            Platform::Facebook => "https://www.facebook.com/",
            Platform::Instagram => "https://www.instagram.com/",
            Platform::TikTok => "https://www.tiktok.com/",
            Platform::Twitter => "https://x.com/",
            Platform::Threads => "https://www.threads.net/",
            Platform::Pinterest => "https://www.pinterest.com/",
            Platform::Vimeo => "https://vimeo.com/",
            Platform::Dailymotion => "https://www.dailymotion.com/",
            Platform::Twitch => "https://www.twitch.tv/",
            Platform::Spotify => "https://open.spotify.com/",
            Platform::SoundCloud => "https://soundcloud.com/",
            Platform::Bandcamp => "https://bandcamp.com/",
            Platform::Deezer => "https://www.deezer.com/",
            Platform::AppleMusic => "https://music.apple.com/",
            Platform::AmazonMusic => "https://music.amazon.com/",
            Platform::Mixcloud => "https://www.mixcloud.com/",
            Platform::Audiomack => "https://audiomack.com/",
        }
    }

    pub fn is_music(&self) -> bool {
        matches!(
            self,
            Platform::Spotify
                | Platform::SoundCloud
                | Platform::Bandcamp
                | Platform::Deezer
                | Platform::AppleMusic
                | Platform::AmazonMusic
                | Platform::Mixcloud
                | Platform::Audiomack
        )
    }

    /// Title used when a page gives none.
    pub fn default_title(&self) -> String {
        match self {
            Platform::Instagram => "Instagram Media".into(),
            Platform::Twitter => "Twitter Media".into(),
            Platform::Threads => "Threads Post".into(),
            Platform::Pinterest => "Pinterest Media".into(),
            Platform::Twitch => "Twitch Media".into(),
            p if p.is_music() => format!("{} Audio", p.display_name()),
            p => format!("{} Video", p.display_name()),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn host_is(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}
