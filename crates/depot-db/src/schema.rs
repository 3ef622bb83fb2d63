diesel::table! {
    packages (pkg_id) {
        pkg_id -> Text,
        name -> Text,
        summary -> Text,
        description -> Text,
        icon_url -> Text,
        version_name -> Text,
        version_code -> BigInt,
        size -> BigInt,
        download_url -> Text,
        license -> Text,
        category -> Text,
        author -> Text,
        homepage -> Text,
        source_url -> Text,
        added -> BigInt,
        last_updated -> BigInt,
        screenshots -> Text,
        anti_features -> Text,
        repo_name -> Text,
        sha256 -> Text,
        changelog -> Text,
    }
}
