//! Pattern-based user-agent classification.
//!
//! Signature tables are compiled once on first use and shared read-only.
//! Tables are ordered: the first matching signature wins, so more specific
//! families (Edge, Samsung Internet, in-app browsers) come before the engines
//! they embed (Chrome, Safari).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::row::{DeviceFlags, Platform};

/// How a captured version is normalized to dotted form.
#[derive(Clone, Copy)]
enum VersionStyle {
    Dotted,
    Underscored,
    WindowsNt,
}

impl VersionStyle {
    fn normalize(self, raw: &str) -> String {
        match self {
            VersionStyle::Dotted => raw.to_string(),
            VersionStyle::Underscored => raw.replace('_', "."),
            VersionStyle::WindowsNt => match raw {
                "10.0" => "10",
                "6.3" => "8.1",
                "6.2" => "8",
                "6.1" => "7",
                "6.0" => "Vista",
                "5.1" | "5.2" => "XP",
                other => other,
            }
            .to_string(),
        }
    }
}

use VersionStyle::{Dotted, Underscored, WindowsNt};

/// A family/version signature. `family: None` takes the family from the
/// pattern's `family` capture group.
struct Signature {
    family: Option<&'static str>,
    pattern: Regex,
    style: VersionStyle,
}

fn compile<P: AsRef<str>>(table: &[(Option<&'static str>, P, VersionStyle)]) -> Vec<Signature> {
    table
        .iter()
        .filter_map(|(family, pattern, style)| {
            Regex::new(pattern.as_ref()).ok().map(|pattern| Signature {
                family: *family,
                pattern,
                style: *style,
            })
        })
        .collect()
}

const V: &str = r"(?P<version>\d+(?:\.\d+)*)";

static BROWSERS: Lazy<Vec<Signature>> = Lazy::new(|| {
    compile(&[
        (None, format!(r"(?P<family>[A-Za-z][A-Za-z0-9_.-]*(?:[Bb]ot|[Ss]pider|[Cc]rawler))/{V}"), Dotted),
        (Some("Edge Mobile"), format!(r"(?:EdgA|EdgiOS)/{V}"), Dotted),
        (Some("Edge"), format!(r"Edge?/{V}"), Dotted),
        (Some("Opera Mini"), format!(r"Opera Mini/{V}"), Dotted),
        (Some("Opera Mobile"), format!(r"OPR/{V}.*Mobile"), Dotted),
        (Some("Opera"), format!(r"(?:OPR|OPiOS)/{V}"), Dotted),
        (Some("Samsung Internet"), format!(r"SamsungBrowser/{V}"), Dotted),
        (Some("Yandex Browser"), format!(r"YaBrowser/{V}"), Dotted),
        (Some("UC Browser"), format!(r"UC ?Browser/{V}"), Dotted),
        (Some("Facebook"), format!(r"FBAV/{V}"), Dotted),
        (Some("Instagram"), format!(r"Instagram {V}"), Dotted),
        (Some("Chrome Mobile iOS"), format!(r"CriOS/{V}"), Dotted),
        (Some("Firefox iOS"), format!(r"FxiOS/{V}"), Dotted),
        (Some("Firefox Mobile"), format!(r"Android.+Firefox/{V}"), Dotted),
        (Some("Firefox"), format!(r"Firefox/{V}"), Dotted),
        (Some("HeadlessChrome"), format!(r"HeadlessChrome/{V}"), Dotted),
        (Some("Chrome Mobile WebView"), format!(r"; wv\).+Chrome/{V}"), Dotted),
        (Some("Chrome Mobile"), format!(r"Chrome/{V} Mobile"), Dotted),
        (Some("Chromium"), format!(r"Chromium/{V}"), Dotted),
        (Some("Chrome"), format!(r"Chrome/{V}"), Dotted),
        (Some("Mobile Safari"), format!(r"Version/{V}.*Mobile.*Safari/"), Dotted),
        (Some("Safari"), format!(r"Version/{V}.*Safari/"), Dotted),
        (Some("IE"), format!(r"MSIE {V}"), Dotted),
        (Some("IE"), format!(r"Trident/.*rv:{V}"), Dotted),
    ])
});

static OPERATING_SYSTEMS: Lazy<Vec<Signature>> = Lazy::new(|| {
    compile(&[
        (Some("Windows Phone"), r"Windows Phone(?: OS)? (?P<version>\d+(?:\.\d+)*)", Dotted),
        (Some("Windows"), r"Windows NT (?P<version>\d+\.\d+)", WindowsNt),
        (Some("iOS"), r"(?:iPhone|CPU) OS (?P<version>\d+(?:_\d+)*)", Underscored),
        (Some("iOS"), r"(?:iPhone|iPad|iPod)", Dotted),
        (Some("Chrome OS"), r"CrOS \S+ (?P<version>\d+(?:\.\d+)*)", Dotted),
        (Some("Mac OS X"), r"Mac OS X (?P<version>\d+(?:[._]\d+)*)", Underscored),
        (Some("Android"), r"Android(?: (?P<version>\d+(?:\.\d+)*))?", Dotted),
        (Some("Ubuntu"), r"Ubuntu(?:/(?P<version>\d+(?:\.\d+)*))?", Dotted),
        (Some("Linux"), r"Linux", Dotted),
    ])
});

static ANDROID_MODEL: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"Android[^;)]*;(?: [a-z]{2}(?:[-_][A-Za-z]{2})?;)? (?P<model>[^;)]+?)(?: Build/[^;)]*)?\)").ok()
});

/// Model prefix → brand for Android devices.
const ANDROID_BRANDS: &[(&str, &str)] = &[
    ("SM-", "Samsung"),
    ("GT-", "Samsung"),
    ("Galaxy", "Samsung"),
    ("Pixel", "Google"),
    ("Nexus", "Google"),
    ("Redmi", "Xiaomi"),
    ("POCO", "Xiaomi"),
    ("Mi ", "Xiaomi"),
    ("M2", "Xiaomi"),
    ("CPH", "OPPO"),
    ("OPPO", "OPPO"),
    ("moto", "Motorola"),
    ("HUAWEI", "Huawei"),
    ("ONEPLUS", "OnePlus"),
    ("LM-", "LG"),
    ("vivo", "vivo"),
];

static BOT: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)bot[/;)_~-]|\bbot\b|\+https?://|slackbot|crawl|spider|slurp|facebookexternalhit|headless|lighthouse|",
        r"curl/|wget/|python-requests|python-urllib|go-http-client|java/|okhttp|scrapy|",
        r"phantomjs|bingpreview|mediapartners|apis-google|feedfetcher|pingdom|uptimerobot"
    ))
    .ok()
});

static TABLET: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"iPad|Tablet|Kindle|Silk/|PlayBook|Nexus (?:7|9|10)\b").ok());

static MOBILE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"iPhone|iPod|Android.*Mobile|Windows Phone|Opera Mini|Mobi|BlackBerry|IEMobile").ok()
});

static DESKTOP: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"Windows NT|Macintosh|X11|CrOS|Linux x86_64|Linux i686").ok());

fn is_match(re: &Lazy<Option<Regex>>, ua: &str) -> bool {
    re.as_ref().map_or(false, |re| re.is_match(ua))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BrowserClass {
    pub family: String,
    pub version: Vec<String>,
    pub version_string: String,
    pub cookies: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OsClass {
    pub family: String,
    pub version: Vec<String>,
    pub version_string: String,
    pub language: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceClass {
    pub brand: String,
    pub model: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UaClassification {
    pub browser: BrowserClass,
    pub os: OsClass,
    pub device: DeviceClass,
    pub flags: DeviceFlags,
}

/// Client-reported values the classifier passes through or uses to fill gaps.
#[derive(Debug, Clone, Default)]
pub struct UaHints {
    pub platform: Option<Platform>,
    pub language: Option<String>,
    pub cookies: bool,
}

/// Classifies user-agent strings into browser, OS and device facets.
///
/// Never fails: unknown strings get the family `"Other"`, empty or missing
/// input gets an empty classification.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserAgentClassifier;

impl UserAgentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, user_agent: Option<&str>, hints: &UaHints) -> UaClassification {
        let ua = user_agent.map(str::trim).unwrap_or_default();

        let mut classification = if ua.is_empty() {
            UaClassification::default()
        } else {
            UaClassification {
                browser: browser(ua),
                os: operating_system(ua),
                device: device(ua),
                flags: flags(ua),
            }
        };

        classification.browser.cookies = hints.cookies;
        if let Some(language) = &hints.language {
            classification.os.language = language.clone();
        }
        if ua.is_empty() && hints.platform == Some(Platform::Mob) {
            classification.flags.mobile = true;
            classification.flags.touch = true;
        }

        classification
    }
}

fn first_match(table: &[Signature], ua: &str) -> Option<(String, Vec<String>)> {
    table.iter().find_map(|sig| {
        let caps = sig.pattern.captures(ua)?;
        let family = match sig.family {
            Some(family) => family.to_string(),
            None => caps.name("family")?.as_str().to_string(),
        };
        let version = caps
            .name("version")
            .map(|m| sig.style.normalize(m.as_str()))
            .map(|v| v.split('.').take(4).map(str::to_string).collect())
            .unwrap_or_default();
        Some((family, version))
    })
}

fn browser(ua: &str) -> BrowserClass {
    let (family, version) = first_match(&BROWSERS, ua).unwrap_or_else(|| ("Other".to_string(), Vec::new()));
    BrowserClass {
        version_string: version.join("."),
        family,
        version,
        cookies: false,
    }
}

fn operating_system(ua: &str) -> OsClass {
    let (family, version) =
        first_match(&OPERATING_SYSTEMS, ua).unwrap_or_else(|| ("Other".to_string(), Vec::new()));
    OsClass {
        version_string: version.join("."),
        family,
        version,
        language: String::new(),
    }
}

fn device(ua: &str) -> DeviceClass {
    let apple = [("iPhone", "iPhone"), ("iPad", "iPad"), ("iPod", "iPod Touch"), ("Macintosh", "Mac")];
    if let Some((_, model)) = apple.iter().find(|(token, _)| ua.contains(token)) {
        return DeviceClass {
            brand: "Apple".to_string(),
            model: model.to_string(),
        };
    }

    let model = ANDROID_MODEL
        .as_ref()
        .and_then(|re| re.captures(ua))
        .and_then(|caps| caps.name("model"))
        .map(|m| m.as_str().trim().to_string());

    match model {
        Some(model) => {
            let brand = ANDROID_BRANDS
                .iter()
                .find(|(prefix, _)| model.starts_with(prefix))
                .map(|(_, brand)| *brand)
                .unwrap_or("Generic");
            DeviceClass {
                brand: brand.to_string(),
                model,
            }
        }
        None => DeviceClass::default(),
    }
}

fn flags(ua: &str) -> DeviceFlags {
    let tablet = is_match(&TABLET, ua) || (ua.contains("Android") && !ua.contains("Mobile"));
    let mobile = !tablet && is_match(&MOBILE, ua);
    let pc = !tablet && !mobile && !ua.contains("Android") && is_match(&DESKTOP, ua);
    DeviceFlags {
        mobile,
        tablet,
        touch: mobile || tablet || ua.contains("Touch"),
        pc,
        bot: is_match(&BOT, ua),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_DESKTOP: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/120.0.6099.109 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1_2 like Mac OS X) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1.2 Mobile/15E148 Safari/604.1";
    const SAMSUNG_ANDROID: &str = "Mozilla/5.0 (Linux; Android 13; SM-S918B) AppleWebKit/537.36 \
        (KHTML, like Gecko) SamsungBrowser/23.0 Chrome/115.0.0.0 Mobile Safari/537.36";
    const GOOGLEBOT: &str =
        "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

    fn classify(ua: &str) -> UaClassification {
        UserAgentClassifier::new().classify(Some(ua), &UaHints::default())
    }

    #[test]
    fn test_desktop_chrome() {
        let c = classify(CHROME_DESKTOP);
        assert_eq!(c.browser.family, "Chrome");
        assert_eq!(c.browser.version, vec!["120", "0", "6099", "109"]);
        assert_eq!(c.browser.version_string, "120.0.6099.109");
        assert_eq!(c.os.family, "Windows");
        assert_eq!(c.os.version_string, "10");
        assert!(c.flags.pc);
        assert!(!c.flags.mobile);
        assert!(!c.flags.tablet);
        assert!(!c.flags.bot);
    }

    #[test]
    fn test_iphone_safari() {
        let c = classify(SAFARI_IPHONE);
        assert_eq!(c.browser.family, "Mobile Safari");
        assert_eq!(c.os.family, "iOS");
        assert_eq!(c.os.version_string, "17.1.2");
        assert_eq!(c.device.brand, "Apple");
        assert_eq!(c.device.model, "iPhone");
        assert!(c.flags.mobile && c.flags.touch);
        assert!(!c.flags.pc);
    }

    #[test]
    fn test_samsung_browser_before_chrome() {
        let c = classify(SAMSUNG_ANDROID);
        assert_eq!(c.browser.family, "Samsung Internet");
        assert_eq!(c.browser.version_string, "23.0");
        assert_eq!(c.os.family, "Android");
        assert_eq!(c.os.version_string, "13");
        assert_eq!(c.device.brand, "Samsung");
        assert_eq!(c.device.model, "SM-S918B");
        assert!(c.flags.mobile);
    }

    #[test]
    fn test_android_without_mobile_is_tablet() {
        let c = classify("Mozilla/5.0 (Linux; Android 12; Pixel Tablet) AppleWebKit/537.36 \
            (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36");
        assert!(c.flags.tablet);
        assert!(!c.flags.mobile);
        assert!(!c.flags.pc);
        assert_eq!(c.device.brand, "Google");
    }

    #[test]
    fn test_bot_detection_is_secondary() {
        let c = classify(GOOGLEBOT);
        assert_eq!(c.browser.family, "Googlebot");
        assert_eq!(c.browser.version_string, "2.1");
        assert!(c.flags.bot);

        let c = classify("curl/8.4.0");
        assert!(c.flags.bot);
        assert_eq!(c.browser.family, "Other");

        for crawler in [
            "Mozilla/5.0 (compatible; bingbot/2.0; +http://www.bing.com/bingbot.htm)",
            "Mozilla/5.0 (compatible; AhrefsBot/7.0; +http://ahrefs.com/robot/)",
            "DuckDuckBot-Https/1.1; (+https://duckduckgo.com/duckduckbot)",
            "Slackbot 1.0 (+https://api.slack.com/robots)",
        ] {
            assert!(classify(crawler).flags.bot, "{crawler}");
        }
    }

    #[test]
    fn test_phone_brand_containing_bot_is_not_a_crawler() {
        let c = classify("Mozilla/5.0 (Linux; Android 12; CUBOT X30) AppleWebKit/537.36 \
            (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36");
        assert!(!c.flags.bot);
        assert!(c.flags.mobile);
        assert_eq!(c.browser.family, "Chrome Mobile");
    }

    #[test]
    fn test_empty_user_agent_is_default() {
        let classifier = UserAgentClassifier::new();
        assert_eq!(classifier.classify(None, &UaHints::default()), UaClassification::default());
        assert_eq!(classifier.classify(Some("  "), &UaHints::default()), UaClassification::default());
    }

    #[test]
    fn test_hints_are_passed_through() {
        let hints = UaHints {
            platform: Some(Platform::Mob),
            language: Some("de-DE".to_string()),
            cookies: true,
        };
        let c = UserAgentClassifier::new().classify(None, &hints);
        assert!(c.browser.cookies);
        assert_eq!(c.os.language, "de-DE");
        assert!(c.flags.mobile);
    }

    #[test]
    fn test_unknown_string_is_other() {
        let c = classify("SomethingElse 1.0");
        assert_eq!(c.browser.family, "Other");
        assert_eq!(c.os.family, "Other");
        assert!(c.browser.version.is_empty());
    }
}
