use serde::Serialize;

/// A traditional-art setting the portrait is painted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: &'static str,
    pub name: &'static str,
    pub short_desc: &'static str,
    pub description: &'static str,
    /// Sent verbatim inside the generation instruction.
    pub prompt_modifier: &'static str,
}

pub static SCENES: &[Scene] = &[
    Scene {
        id: "qingming",
        name: "清明上河图",
        short_desc: "北宋汴京的繁华市井",
        description: "置身于张择端笔下的北宋都城，繁忙的汴河，熙攘的人群，古朴的虹桥。",
        prompt_modifier: "Place the person into the bustling street scene of \"Along the River During the Qingming Festival\" (Qingming Shanghe Tu). Style: Traditional Chinese panoramic handscroll painting, meticulous Gongbi style, pale browns and greens (ink wash), Song Dynasty clothing and architecture, detailed city life.",
    },
    Scene {
        id: "tang_dynasty",
        name: "大唐盛世",
        short_desc: "雍容华贵的盛唐气象",
        description: "漫步于长安城，牡丹盛开，金碧辉煌的宫殿，感受万国来朝的盛唐风采。",
        prompt_modifier: "Place the person in a majestic Tang Dynasty palace garden scene with blooming peonies. Style: Rich and vibrant colors, opulent Tang aesthetics, \"Heavy Color\" (Zhongcai) style, elegant flowing Hanfu robes of the Tang era, golden ornaments, atmospheric and grand.",
    },
    Scene {
        id: "dunhuang",
        name: "敦煌飞天",
        short_desc: "西域石窟的艺术瑰宝",
        description: "化身为莫高窟壁画中的飞天，飘逸的丝带，神秘的西域风情。",
        prompt_modifier: "Transform the person into a celestial being (Apsara) from the Dunhuang Mogao Caves murals. Style: Ancient mural texture, mineral pigments (ochre, malachite green, azurite blue), floating ribbons, ethereal pose, desert cave background with Buddhist artistic elements.",
    },
    Scene {
        id: "jiangnan",
        name: "江南烟雨",
        short_desc: "水墨丹青的诗意水乡",
        description: "泛舟于烟雨朦胧的江南水乡，黑瓦白墙，小桥流水。",
        prompt_modifier: "Place the person on a small boat in a misty Jiangnan water town. Style: Classic Chinese Ink Wash Painting (Shui-mo), high contrast black ink on white paper, wet wash effects, traditional architecture with white walls and black tiles, serene and poetic atmosphere.",
    },
    Scene {
        id: "great_wall",
        name: "长城雄风",
        short_desc: "巍峨连绵的万里长城",
        description: "伫立于群山之巅的烽火台上，苍松翠柏，云海翻腾。",
        prompt_modifier: "Place the person standing heroically on the Great Wall of China during sunset. Style: Realistic oil painting style with Chinese artistic sensibilities, dramatic lighting, majestic mountains in the background, rolling clouds, ancient stone textures, Ming Dynasty armor or noble clothing.",
    },
    Scene {
        id: "peach_blossom",
        name: "桃花源记",
        short_desc: "落英缤纷的世外桃源",
        description: "忽逢桃花林，夹岸数百步，中无杂树，芳草鲜美。",
        prompt_modifier: "Place the person in the utopian \"Peach Blossom Spring\". Style: Ethereal landscape painting (Shan Shui), blooming peach blossom trees everywhere, pink and green color palette, soft lighting, idyllic rural setting, simple yet elegant ancient hermit clothing.",
    },
];

pub fn default_scene() -> &'static Scene {
    &SCENES[0]
}

pub fn find_scene(id: &str) -> Option<&'static Scene> {
    SCENES.iter().find(|scene| scene.id == id)
}
